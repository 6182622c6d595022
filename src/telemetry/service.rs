use super::models::{MigrateLogsOutcome, NewPlaybackLog, PlaybackStats, StatsScope};
use super::remote_store::RemoteTelemetryStore;
use super::sqlite_store::SqliteTelemetryStore;
use super::store::TelemetryStore;
use crate::sync::{MirrorHandle, MirrorJob, SyncPolicy};
use anyhow::Result;
use std::sync::Arc;

/// Telemetry domain API, same dual-backend discipline as the library:
/// authoritative writes to the primary store, best-effort mirror jobs for
/// the other one.
pub struct TelemetryService {
    local: Arc<SqliteTelemetryStore>,
    remote: Option<Arc<RemoteTelemetryStore>>,
    policy: SyncPolicy,
    mirror: Option<MirrorHandle>,
}

impl TelemetryService {
    pub fn new(
        local: Arc<SqliteTelemetryStore>,
        remote: Option<Arc<RemoteTelemetryStore>>,
        policy: SyncPolicy,
        mirror: Option<MirrorHandle>,
    ) -> Result<TelemetryService> {
        if policy.remote_primary && remote.is_none() {
            anyhow::bail!("Remote store marked primary but no remote client is configured");
        }
        Ok(TelemetryService {
            local,
            remote,
            policy,
            mirror,
        })
    }

    fn primary(&self) -> &dyn TelemetryStore {
        match (&self.remote, self.policy.remote_primary) {
            (Some(remote), true) => remote.as_ref(),
            _ => self.local.as_ref(),
        }
    }

    fn enqueue_mirror(&self, job: MirrorJob) {
        if !self.policy.mirroring_enabled() {
            return;
        }
        if let Some(handle) = &self.mirror {
            handle.enqueue(job);
        }
    }

    pub async fn insert_playback_log(&self, entry: NewPlaybackLog) -> Result<()> {
        self.primary().insert_playback_log(&entry).await?;
        self.enqueue_mirror(MirrorJob::InsertPlaybackLog(entry));
        Ok(())
    }

    pub async fn playback_stats(&self, scope: StatsScope) -> Result<PlaybackStats> {
        self.primary().playback_stats(scope).await
    }

    pub async fn migrate_anonymous_logs(&self, user_id: i64) -> Result<MigrateLogsOutcome> {
        let outcome = self.primary().migrate_anonymous_logs(user_id).await?;
        self.enqueue_mirror(MirrorJob::MigrateAnonymousLogs { user_id });
        Ok(outcome)
    }
}
