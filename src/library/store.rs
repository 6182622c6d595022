use super::models::{FavoriteSong, NewFavorite, NewPlaylistItem, PlaylistItem, SessionUser, User, UserRole};
use anyhow::Result;
use async_trait::async_trait;

/// Storage contract for users, sessions, favorites and playlists, implemented
/// by both the embedded SQLite store and the remote REST store so either can
/// act as the authoritative backend.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Returns Ok(None) if the user does not exist.
    async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>>;

    /// Account lookup; the account is expected to be normalized already.
    async fn get_user_by_account(&self, account: &str) -> Result<Option<User>>;

    /// Fails on a duplicate account.
    async fn create_user(&self, account: &str, password_hash: &str, role: UserRole)
        -> Result<User>;

    /// Creates the user or refreshes password/role/active flag in place.
    async fn upsert_user_by_account(
        &self,
        account: &str,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User>;

    async fn create_auth_session(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: &str,
    ) -> Result<()>;

    /// No-op if the session does not exist.
    async fn delete_auth_session(&self, token_hash: &str) -> Result<()>;

    async fn delete_expired_sessions(&self) -> Result<()>;

    /// Resolves a session by token hash. Expired sessions are lazily deleted
    /// as part of this same lookup pass; inactive users resolve to None.
    async fn get_session_user(&self, token_hash: &str) -> Result<Option<SessionUser>>;

    /// Most recently favorited first.
    async fn list_favorite_songs(&self, user_id: i64) -> Result<Vec<FavoriteSong>>;

    /// Idempotent: re-adding an existing (user, song) pair is a no-op.
    async fn add_favorite_song(&self, favorite: &NewFavorite) -> Result<()>;

    /// Idempotent: removing an absent favorite is a no-op.
    async fn remove_favorite_song(&self, user_id: i64, song_id: &str) -> Result<()>;

    /// Ordered by position, then id.
    async fn list_playlist_items(&self, user_id: i64, playlist_id: &str)
        -> Result<Vec<PlaylistItem>>;

    /// Appends at max position + 1. Returns false if the song is already in
    /// the playlist.
    async fn add_playlist_item(&self, item: &NewPlaylistItem) -> Result<bool>;

    /// Deletes the item and compacts the remaining positions back to a dense
    /// zero-based sequence.
    async fn remove_playlist_item(
        &self,
        user_id: i64,
        playlist_id: &str,
        song_id: &str,
    ) -> Result<()>;

    /// Whole-list position rewrite. Returns false (leaving the stored order
    /// unchanged) unless the supplied song ids exactly match the stored set.
    async fn reorder_playlist_items(
        &self,
        user_id: i64,
        playlist_id: &str,
        song_ids: &[String],
    ) -> Result<bool>;

    /// Replaces the playlist with the given snapshot (delete then reinsert).
    /// Used by mirror replication, where re-running a partially applied
    /// snapshot must converge rather than error.
    async fn replace_playlist_items(
        &self,
        user_id: i64,
        playlist_id: &str,
        items: &[PlaylistItem],
    ) -> Result<()>;
}
