//! Best-effort replication to the non-primary backend.
//!
//! Mutations committed on the primary store enqueue a job here; a single
//! background worker drains the queue against the mirror store. Enqueueing
//! never blocks the caller and a failed job is logged and counted, never
//! retried synchronously.

use crate::library::models::{NewFavorite, NewPlaylistItem, PlaylistItem, UserRole};
use crate::library::LibraryStore;
use crate::server::metrics::{MIRROR_JOBS_TOTAL, MIRROR_QUEUE_DROPS_TOTAL};
use crate::telemetry::models::NewPlaybackLog;
use crate::telemetry::TelemetryStore;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, warn};

const MIRROR_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum MirrorJob {
    UpsertUser {
        account: String,
        password_hash: String,
        role: UserRole,
    },
    CreateSession {
        user_id: i64,
        token_hash: String,
        expires_at: String,
    },
    DeleteSession {
        token_hash: String,
    },
    DeleteExpiredSessions,
    AddFavorite(NewFavorite),
    RemoveFavorite {
        user_id: i64,
        song_id: String,
    },
    AddPlaylistItem(NewPlaylistItem),
    /// Whole-list rewrite; re-runnable, converges even after a partial
    /// earlier attempt.
    PlaylistSnapshot {
        user_id: i64,
        playlist_id: String,
        items: Vec<PlaylistItem>,
    },
    InsertPlaybackLog(NewPlaybackLog),
    MigrateAnonymousLogs {
        user_id: i64,
    },
}

impl MirrorJob {
    pub fn kind(&self) -> &'static str {
        match self {
            MirrorJob::UpsertUser { .. } => "upsert_user",
            MirrorJob::CreateSession { .. } => "create_session",
            MirrorJob::DeleteSession { .. } => "delete_session",
            MirrorJob::DeleteExpiredSessions => "delete_expired_sessions",
            MirrorJob::AddFavorite(_) => "add_favorite",
            MirrorJob::RemoveFavorite { .. } => "remove_favorite",
            MirrorJob::AddPlaylistItem(_) => "add_playlist_item",
            MirrorJob::PlaylistSnapshot { .. } => "playlist_snapshot",
            MirrorJob::InsertPlaybackLog(_) => "insert_playback_log",
            MirrorJob::MigrateAnonymousLogs { .. } => "migrate_anonymous_logs",
        }
    }
}

#[derive(Clone)]
pub struct MirrorHandle {
    tx: mpsc::Sender<MirrorJob>,
}

impl MirrorHandle {
    /// Never blocks. A full queue drops the job; the drop is logged and
    /// counted, and the caller's request is unaffected.
    pub fn enqueue(&self, job: MirrorJob) {
        let kind = job.kind();
        if self.tx.try_send(job).is_err() {
            MIRROR_QUEUE_DROPS_TOTAL.inc();
            warn!("Mirror queue full, dropping {} job", kind);
        }
    }
}

/// Spawns the worker that replays jobs against the mirror (non-primary)
/// stores.
pub fn spawn_mirror_worker(
    library: Arc<dyn LibraryStore>,
    telemetry: Arc<dyn TelemetryStore>,
) -> MirrorHandle {
    let (tx, mut rx) = mpsc::channel::<MirrorJob>(MIRROR_QUEUE_CAPACITY);

    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let kind = job.kind();
            match apply_job(library.as_ref(), telemetry.as_ref(), job).await {
                Ok(()) => {
                    MIRROR_JOBS_TOTAL.with_label_values(&[kind, "ok"]).inc();
                }
                Err(err) => {
                    MIRROR_JOBS_TOTAL.with_label_values(&[kind, "error"]).inc();
                    error!("Mirror {} job failed: {:#}", kind, err);
                }
            }
        }
    });

    MirrorHandle { tx }
}

async fn apply_job(
    library: &dyn LibraryStore,
    telemetry: &dyn TelemetryStore,
    job: MirrorJob,
) -> Result<()> {
    match job {
        MirrorJob::UpsertUser {
            account,
            password_hash,
            role,
        } => {
            library
                .upsert_user_by_account(&account, &password_hash, role)
                .await?;
        }
        MirrorJob::CreateSession {
            user_id,
            token_hash,
            expires_at,
        } => {
            library
                .create_auth_session(user_id, &token_hash, &expires_at)
                .await?;
        }
        MirrorJob::DeleteSession { token_hash } => {
            library.delete_auth_session(&token_hash).await?;
        }
        MirrorJob::DeleteExpiredSessions => {
            library.delete_expired_sessions().await?;
        }
        MirrorJob::AddFavorite(favorite) => {
            library.add_favorite_song(&favorite).await?;
        }
        MirrorJob::RemoveFavorite { user_id, song_id } => {
            library.remove_favorite_song(user_id, &song_id).await?;
        }
        MirrorJob::AddPlaylistItem(item) => {
            library.add_playlist_item(&item).await?;
        }
        MirrorJob::PlaylistSnapshot {
            user_id,
            playlist_id,
            items,
        } => {
            library
                .replace_playlist_items(user_id, &playlist_id, &items)
                .await?;
        }
        MirrorJob::InsertPlaybackLog(entry) => {
            telemetry.insert_playback_log(&entry).await?;
        }
        MirrorJob::MigrateAnonymousLogs { user_id } => {
            telemetry.migrate_anonymous_logs(user_id).await?;
        }
    }
    Ok(())
}
