use super::models::{
    now_iso, FavoriteSong, NewFavorite, NewPlaylistItem, PlaylistItem, SessionUser, User, UserRole,
};
use super::store::LibraryStore;
use crate::supabase::{Filter, Query, SupabaseClient};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const USER_SELECT: &str = "id,email,password_hash,role,is_active,created_at,updated_at";

/// Library storage over the remote REST store.
///
/// The remote service has no multi-row transactions; correctness under
/// concurrent writers relies on the per-table unique constraints and on
/// whole-list snapshot rewrites for playlists.
pub struct RemoteLibraryStore {
    client: Arc<SupabaseClient>,
}

impl RemoteLibraryStore {
    pub fn new(client: Arc<SupabaseClient>) -> RemoteLibraryStore {
        RemoteLibraryStore { client }
    }

    async fn compact_playlist_positions(&self, user_id: i64, playlist_id: &str) -> Result<()> {
        let rows: Vec<PlaylistRow> = self
            .client
            .fetch_rows(
                "playlist_items",
                &playlist_filters(user_id, playlist_id),
                &Query {
                    select: "song_id,song_title,album_name,position,created_at,id",
                    order: &["position.asc", "id.asc"],
                    ..Query::default()
                },
            )
            .await?;

        for (index, row) in rows.iter().enumerate() {
            if row.position == index as i64 {
                continue;
            }
            let mut filters = playlist_filters(user_id, playlist_id);
            filters.push(Filter::eq("song_id", &row.song_id));
            self.client
                .patch_rows("playlist_items", &json!({ "position": index }), &filters)
                .await?;
        }
        Ok(())
    }
}

fn playlist_filters(user_id: i64, playlist_id: &str) -> Vec<Filter> {
    vec![
        Filter::eq("user_id", user_id),
        Filter::eq("playlist_id", playlist_id),
    ]
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    role: String,
    is_active: serde_json::Value,
    created_at: String,
    updated_at: String,
}

impl UserRow {
    fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            password_hash: self.password_hash,
            role: UserRole::parse(&self.role),
            is_active: active_flag(&self.is_active),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// The embedded store keeps the flag as 0/1, the remote one as a boolean;
/// replicated rows can carry either shape.
fn active_flag(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

#[derive(Debug, Deserialize)]
struct SessionRow {
    user_id: i64,
    expires_at: String,
}

#[derive(Debug, Deserialize)]
struct FavoriteRow {
    song_id: String,
    song_title: String,
    album_name: String,
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistRow {
    song_id: String,
    song_title: String,
    album_name: String,
    position: i64,
    created_at: String,
}

fn is_past(expires_at: &str) -> bool {
    match DateTime::parse_from_rfc3339(expires_at) {
        Ok(expiry) => expiry <= Utc::now(),
        // An unparseable expiry is left for the lexicographic server-side sweep
        Err(_) => false,
    }
}

#[async_trait]
impl LibraryStore for RemoteLibraryStore {
    async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let row: Option<UserRow> = self
            .client
            .fetch_one(
                "users",
                &[Filter::eq("id", user_id)],
                &Query {
                    select: USER_SELECT,
                    ..Query::default()
                },
            )
            .await?;
        Ok(row.map(UserRow::into_user))
    }

    async fn get_user_by_account(&self, account: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = self
            .client
            .fetch_one(
                "users",
                &[Filter::eq("email", account)],
                &Query {
                    select: USER_SELECT,
                    ..Query::default()
                },
            )
            .await?;
        Ok(row.map(UserRow::into_user))
    }

    async fn create_user(
        &self,
        account: &str,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User> {
        let now = now_iso();
        let next_id = self.client.next_table_id("users").await?;
        let rows: Vec<UserRow> = self
            .client
            .insert_rows(
                "users",
                &[json!({
                    "id": next_id,
                    "email": account,
                    "password_hash": password_hash,
                    "role": role.as_str(),
                    "is_active": true,
                    "created_at": now,
                    "updated_at": now,
                })],
            )
            .await?;
        rows.into_iter()
            .next()
            .map(UserRow::into_user)
            .context("Remote user insert returned no row")
    }

    async fn upsert_user_by_account(
        &self,
        account: &str,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User> {
        let Some(existing) = self.get_user_by_account(account).await? else {
            return self.create_user(account, password_hash, role).await;
        };

        self.client
            .patch_rows(
                "users",
                &json!({
                    "password_hash": password_hash,
                    "role": role.as_str(),
                    "is_active": true,
                    "updated_at": now_iso(),
                }),
                &[Filter::eq("id", existing.id)],
            )
            .await?;
        self.get_user_by_id(existing.id)
            .await?
            .context("Remote user vanished during upsert")
    }

    async fn create_auth_session(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: &str,
    ) -> Result<()> {
        let next_id = self.client.next_table_id("auth_sessions").await?;
        let _: Vec<serde_json::Value> = self
            .client
            .insert_rows(
                "auth_sessions",
                &[json!({
                    "id": next_id,
                    "user_id": user_id,
                    "token_hash": token_hash,
                    "expires_at": expires_at,
                })],
            )
            .await?;
        Ok(())
    }

    async fn delete_auth_session(&self, token_hash: &str) -> Result<()> {
        self.client
            .delete_rows("auth_sessions", &[Filter::eq("token_hash", token_hash)])
            .await
    }

    async fn delete_expired_sessions(&self) -> Result<()> {
        self.client
            .delete_rows("auth_sessions", &[Filter::lte("expires_at", now_iso())])
            .await
    }

    async fn get_session_user(&self, token_hash: &str) -> Result<Option<SessionUser>> {
        self.delete_expired_sessions().await?;

        let session: Option<SessionRow> = self
            .client
            .fetch_one(
                "auth_sessions",
                &[Filter::eq("token_hash", token_hash)],
                &Query {
                    select: "user_id,expires_at",
                    ..Query::default()
                },
            )
            .await?;
        let Some(session) = session else {
            return Ok(None);
        };

        if is_past(&session.expires_at) {
            self.delete_auth_session(token_hash).await?;
            return Ok(None);
        }

        let Some(user) = self.get_user_by_id(session.user_id).await? else {
            return Ok(None);
        };
        if !user.is_active {
            return Ok(None);
        }
        Ok(Some(SessionUser {
            user,
            session_expires_at: session.expires_at,
        }))
    }

    async fn list_favorite_songs(&self, user_id: i64) -> Result<Vec<FavoriteSong>> {
        let rows: Vec<FavoriteRow> = self
            .client
            .fetch_rows(
                "favorite_songs",
                &[Filter::eq("user_id", user_id)],
                &Query {
                    select: "song_id,song_title,album_name,created_at",
                    order: &["created_at.desc"],
                    ..Query::default()
                },
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| FavoriteSong {
                song_id: row.song_id,
                song_title: row.song_title,
                album_name: row.album_name,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn add_favorite_song(&self, favorite: &NewFavorite) -> Result<()> {
        let existing: Option<serde_json::Value> = self
            .client
            .fetch_one(
                "favorite_songs",
                &[
                    Filter::eq("user_id", favorite.user_id),
                    Filter::eq("song_id", &favorite.song_id),
                ],
                &Query {
                    select: "id",
                    ..Query::default()
                },
            )
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        let next_id = self.client.next_table_id("favorite_songs").await?;
        let _: Vec<serde_json::Value> = self
            .client
            .insert_rows(
                "favorite_songs",
                &[json!({
                    "id": next_id,
                    "user_id": favorite.user_id,
                    "song_id": favorite.song_id,
                    "song_title": favorite.song_title,
                    "album_name": favorite.album_name,
                })],
            )
            .await?;
        Ok(())
    }

    async fn remove_favorite_song(&self, user_id: i64, song_id: &str) -> Result<()> {
        self.client
            .delete_rows(
                "favorite_songs",
                &[Filter::eq("user_id", user_id), Filter::eq("song_id", song_id)],
            )
            .await
    }

    async fn list_playlist_items(
        &self,
        user_id: i64,
        playlist_id: &str,
    ) -> Result<Vec<PlaylistItem>> {
        let rows: Vec<PlaylistRow> = self
            .client
            .fetch_rows(
                "playlist_items",
                &playlist_filters(user_id, playlist_id),
                &Query {
                    select: "song_id,song_title,album_name,position,created_at,id",
                    order: &["position.asc", "id.asc"],
                    ..Query::default()
                },
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| PlaylistItem {
                song_id: row.song_id,
                song_title: row.song_title,
                album_name: row.album_name,
                position: row.position,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn add_playlist_item(&self, item: &NewPlaylistItem) -> Result<bool> {
        let mut exists_filters = playlist_filters(item.user_id, &item.playlist_id);
        exists_filters.push(Filter::eq("song_id", &item.song_id));
        let existing: Option<serde_json::Value> = self
            .client
            .fetch_one(
                "playlist_items",
                &exists_filters,
                &Query {
                    select: "song_id",
                    ..Query::default()
                },
            )
            .await?;
        if existing.is_some() {
            return Ok(false);
        }

        #[derive(Deserialize)]
        struct PositionRow {
            position: i64,
        }
        let last: Option<PositionRow> = self
            .client
            .fetch_one(
                "playlist_items",
                &playlist_filters(item.user_id, &item.playlist_id),
                &Query {
                    select: "position,id",
                    order: &["position.desc", "id.desc"],
                    ..Query::default()
                },
            )
            .await?;
        let next_position = last.map(|row| row.position + 1).unwrap_or(0);

        let next_id = self.client.next_table_id("playlist_items").await?;
        let _: Vec<serde_json::Value> = self
            .client
            .insert_rows(
                "playlist_items",
                &[json!({
                    "id": next_id,
                    "user_id": item.user_id,
                    "playlist_id": item.playlist_id,
                    "song_id": item.song_id,
                    "song_title": item.song_title,
                    "album_name": item.album_name,
                    "position": next_position,
                })],
            )
            .await?;
        Ok(true)
    }

    async fn remove_playlist_item(
        &self,
        user_id: i64,
        playlist_id: &str,
        song_id: &str,
    ) -> Result<()> {
        let mut filters = playlist_filters(user_id, playlist_id);
        filters.push(Filter::eq("song_id", song_id));
        self.client.delete_rows("playlist_items", &filters).await?;
        self.compact_playlist_positions(user_id, playlist_id).await
    }

    async fn reorder_playlist_items(
        &self,
        user_id: i64,
        playlist_id: &str,
        song_ids: &[String],
    ) -> Result<bool> {
        #[derive(Deserialize)]
        struct SongIdRow {
            song_id: String,
        }
        let existing: Vec<SongIdRow> = self
            .client
            .fetch_rows(
                "playlist_items",
                &playlist_filters(user_id, playlist_id),
                &Query {
                    select: "song_id",
                    ..Query::default()
                },
            )
            .await?;

        if existing.len() != song_ids.len() {
            return Ok(false);
        }
        let existing_set: std::collections::HashSet<&str> =
            existing.iter().map(|row| row.song_id.as_str()).collect();
        if !song_ids.iter().all(|id| existing_set.contains(id.as_str())) {
            return Ok(false);
        }

        for (index, song_id) in song_ids.iter().enumerate() {
            let mut filters = playlist_filters(user_id, playlist_id);
            filters.push(Filter::eq("song_id", song_id));
            self.client
                .patch_rows("playlist_items", &json!({ "position": index }), &filters)
                .await?;
        }
        Ok(true)
    }

    async fn replace_playlist_items(
        &self,
        user_id: i64,
        playlist_id: &str,
        items: &[PlaylistItem],
    ) -> Result<()> {
        self.client
            .delete_rows("playlist_items", &playlist_filters(user_id, playlist_id))
            .await?;
        if items.is_empty() {
            return Ok(());
        }

        let base_id = self.client.next_table_id("playlist_items").await?;
        let rows: Vec<serde_json::Value> = items
            .iter()
            .enumerate()
            .map(|(offset, item)| {
                json!({
                    "id": base_id + offset as i64,
                    "user_id": user_id,
                    "playlist_id": playlist_id,
                    "song_id": item.song_id,
                    "song_title": item.song_title,
                    "album_name": item.album_name,
                    "position": item.position,
                    "created_at": item.created_at,
                })
            })
            .collect();
        self.client
            .upsert_rows(
                "playlist_items",
                &rows,
                &["user_id", "playlist_id", "song_id"],
            )
            .await
    }
}
