use super::auth::{generate_session_token, hash_password, hash_session_token, verify_password};
use super::models::{
    normalize_account, FavoriteSong, NewFavorite, NewPlaylistItem, PlaylistItem, SessionUser, User,
    UserRole,
};
use super::remote_store::RemoteLibraryStore;
use super::sqlite_store::SqliteLibraryStore;
use super::store::LibraryStore;
use crate::sync::{MirrorHandle, MirrorJob, SyncPolicy};
use anyhow::Result;
use chrono::{Duration, SecondsFormat, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Domain-level rejection vs. genuine backend failure. The HTTP layer maps
/// the first two to 4xx responses; only `Backend` becomes a 5xx.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("account already registered")]
    DuplicateAccount,
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

fn invalid(message: &str) -> DomainError {
    DomainError::InvalidInput(message.to_string())
}

#[derive(Debug, Clone)]
pub struct PersistedSession {
    /// Raw token, handed to the caller for cookie storage exactly once.
    pub token: String,
    pub max_age_seconds: i64,
}

/// Library domain API. Authoritative reads and writes go to whichever store
/// the sync policy marks as primary; committed mutations additionally enqueue
/// a best-effort mirror job for the other store.
pub struct LibraryService {
    local: Arc<SqliteLibraryStore>,
    remote: Option<Arc<RemoteLibraryStore>>,
    policy: SyncPolicy,
    mirror: Option<MirrorHandle>,
    session_max_age_seconds: i64,
}

impl LibraryService {
    pub fn new(
        local: Arc<SqliteLibraryStore>,
        remote: Option<Arc<RemoteLibraryStore>>,
        policy: SyncPolicy,
        mirror: Option<MirrorHandle>,
        session_max_age_seconds: i64,
    ) -> Result<LibraryService> {
        if policy.remote_primary && remote.is_none() {
            anyhow::bail!("Remote store marked primary but no remote client is configured");
        }
        Ok(LibraryService {
            local,
            remote,
            policy,
            mirror,
            session_max_age_seconds,
        })
    }

    fn primary(&self) -> &dyn LibraryStore {
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

    pub async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>, DomainError> {
        Ok(self.primary().get_user_by_id(user_id).await?)
    }

    pub async fn get_user_by_account(&self, account: &str) -> Result<Option<User>, DomainError> {
        let account = normalize_account(account);
        if account.is_empty() {
            return Ok(None);
        }
        Ok(self.primary().get_user_by_account(&account).await?)
    }

    pub async fn create_user(
        &self,
        account: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User, DomainError> {
        let account = normalize_account(account);
        if account.is_empty() {
            return Err(invalid("Account is required"));
        }
        if password.is_empty() {
            return Err(invalid("Password is required"));
        }
        if self.primary().get_user_by_account(&account).await?.is_some() {
            return Err(DomainError::DuplicateAccount);
        }

        let password_hash = hash_password(password)?;
        let user = self
            .primary()
            .create_user(&account, &password_hash, role)
            .await?;
        self.enqueue_mirror(MirrorJob::UpsertUser {
            account,
            password_hash,
            role,
        });
        Ok(user)
    }

    /// Create-or-update by account; used for admin bootstrap and password
    /// resets.
    pub async fn upsert_user(
        &self,
        account: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User, DomainError> {
        let account = normalize_account(account);
        if account.is_empty() {
            return Err(invalid("Account is required"));
        }
        if password.is_empty() {
            return Err(invalid("Password is required"));
        }

        let password_hash = hash_password(password)?;
        let user = self
            .primary()
            .upsert_user_by_account(&account, &password_hash, role)
            .await?;
        self.enqueue_mirror(MirrorJob::UpsertUser {
            account,
            password_hash,
            role,
        });
        Ok(user)
    }

    /// Account lookup plus constant-time password verification. The stored
    /// hash never leaves the service.
    pub async fn verify_login(
        &self,
        account: &str,
        password: &str,
    ) -> Result<Option<User>, DomainError> {
        let Some(user) = self.get_user_by_account(account).await? else {
            return Ok(None);
        };
        if !user.is_active || !verify_password(password, &user.password_hash) {
            return Ok(None);
        }
        Ok(Some(user))
    }

    pub async fn create_persisted_session(
        &self,
        user_id: i64,
    ) -> Result<PersistedSession, DomainError> {
        let token = generate_session_token();
        let token_hash = hash_session_token(&token);
        let max_age_seconds = self.session_max_age_seconds;
        let expires_at = (Utc::now() + Duration::seconds(max_age_seconds))
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        self.primary()
            .create_auth_session(user_id, &token_hash, &expires_at)
            .await?;
        self.enqueue_mirror(MirrorJob::CreateSession {
            user_id,
            token_hash,
            expires_at,
        });
        self.enqueue_mirror(MirrorJob::DeleteExpiredSessions);
        Ok(PersistedSession {
            token,
            max_age_seconds,
        })
    }

    /// Expired or unknown tokens resolve to None, never an error; expired
    /// rows are cleaned up by the store as part of the lookup.
    pub async fn resolve_session(
        &self,
        raw_token: &str,
    ) -> Result<Option<SessionUser>, DomainError> {
        if raw_token.is_empty() {
            return Ok(None);
        }
        let token_hash = hash_session_token(raw_token);
        Ok(self.primary().get_session_user(&token_hash).await?)
    }

    pub async fn remove_session(&self, raw_token: &str) -> Result<(), DomainError> {
        if raw_token.is_empty() {
            return Ok(());
        }
        let token_hash = hash_session_token(raw_token);
        self.primary().delete_auth_session(&token_hash).await?;
        self.enqueue_mirror(MirrorJob::DeleteSession { token_hash });
        Ok(())
    }

    pub async fn list_favorites(&self, user_id: i64) -> Result<Vec<FavoriteSong>, DomainError> {
        Ok(self.primary().list_favorite_songs(user_id).await?)
    }

    pub async fn add_favorite(&self, favorite: NewFavorite) -> Result<(), DomainError> {
        if favorite.song_id.is_empty()
            || favorite.song_title.is_empty()
            || favorite.album_name.is_empty()
        {
            return Err(invalid("Missing song payload"));
        }
        self.primary().add_favorite_song(&favorite).await?;
        self.enqueue_mirror(MirrorJob::AddFavorite(favorite));
        Ok(())
    }

    pub async fn remove_favorite(&self, user_id: i64, song_id: &str) -> Result<(), DomainError> {
        if song_id.is_empty() {
            return Ok(());
        }
        self.primary().remove_favorite_song(user_id, song_id).await?;
        self.enqueue_mirror(MirrorJob::RemoveFavorite {
            user_id,
            song_id: song_id.to_string(),
        });
        Ok(())
    }

    pub async fn list_playlist(
        &self,
        user_id: i64,
        playlist_id: &str,
    ) -> Result<Vec<PlaylistItem>, DomainError> {
        Ok(self.primary().list_playlist_items(user_id, playlist_id).await?)
    }

    /// Returns false when the song is already in the playlist.
    pub async fn add_playlist_item(&self, item: NewPlaylistItem) -> Result<bool, DomainError> {
        if item.song_id.is_empty() || item.song_title.is_empty() || item.album_name.is_empty() {
            return Err(invalid("Missing playlist payload"));
        }
        let added = self.primary().add_playlist_item(&item).await?;
        if added {
            self.enqueue_mirror(MirrorJob::AddPlaylistItem(item));
        }
        Ok(added)
    }

    pub async fn remove_playlist_item(
        &self,
        user_id: i64,
        playlist_id: &str,
        song_id: &str,
    ) -> Result<(), DomainError> {
        if song_id.is_empty() {
            return Ok(());
        }
        self.primary()
            .remove_playlist_item(user_id, playlist_id, song_id)
            .await?;
        self.mirror_playlist_snapshot(user_id, playlist_id).await?;
        Ok(())
    }

    /// Returns false (order unchanged) when the submitted ids do not exactly
    /// match the stored set.
    pub async fn reorder_playlist(
        &self,
        user_id: i64,
        playlist_id: &str,
        song_ids: &[String],
    ) -> Result<bool, DomainError> {
        if song_ids.is_empty() {
            return Err(invalid("songIds is required"));
        }
        let applied = self
            .primary()
            .reorder_playlist_items(user_id, playlist_id, song_ids)
            .await?;
        if applied {
            self.mirror_playlist_snapshot(user_id, playlist_id).await?;
        }
        Ok(applied)
    }

    /// Structural playlist changes replicate as a whole-list snapshot so the
    /// mirror converges even if its view had drifted.
    async fn mirror_playlist_snapshot(
        &self,
        user_id: i64,
        playlist_id: &str,
    ) -> Result<(), DomainError> {
        if !self.policy.mirroring_enabled() {
            return Ok(());
        }
        let items = self.primary().list_playlist_items(user_id, playlist_id).await?;
        self.enqueue_mirror(MirrorJob::PlaylistSnapshot {
            user_id,
            playlist_id: playlist_id.to_string(),
            items,
        });
        Ok(())
    }
}
