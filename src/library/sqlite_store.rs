use super::models::{
    now_iso, FavoriteSong, NewFavorite, NewPlaylistItem, PlaylistItem, SessionUser, User, UserRole,
};
use super::store::LibraryStore;
use crate::sqlite_persistence::EmbeddedDb;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashSet;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, email, password_hash, role, is_active, created_at, updated_at";

/// Library storage over the embedded SQLite database.
///
/// Multi-row mutations (playlist add/remove/reorder, snapshot replace) run in
/// BEGIN IMMEDIATE transactions so concurrent writers serialize instead of
/// interleaving with the position compaction.
#[derive(Clone)]
pub struct SqliteLibraryStore {
    db: Arc<EmbeddedDb>,
}

impl SqliteLibraryStore {
    pub fn new(db: Arc<EmbeddedDb>) -> SqliteLibraryStore {
        SqliteLibraryStore { db }
    }
}

fn map_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role: UserRole::parse(&row.get::<_, String>(3)?),
        is_active: row.get::<_, i64>(4)? == 1,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn get_user_by_id_sync(conn: &Connection, user_id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![user_id],
            map_user_row,
        )
        .optional()?;
    Ok(user)
}

fn get_user_by_account_sync(conn: &Connection, account: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            params![account],
            map_user_row,
        )
        .optional()?;
    Ok(user)
}

fn compact_playlist_positions(conn: &Connection, user_id: i64, playlist_id: &str) -> Result<()> {
    let ids: Vec<i64> = conn
        .prepare(
            "SELECT id FROM playlist_items
             WHERE user_id = ?1 AND playlist_id = ?2
             ORDER BY position ASC, id ASC",
        )?
        .query_map(params![user_id, playlist_id], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    let mut update = conn.prepare("UPDATE playlist_items SET position = ?1 WHERE id = ?2")?;
    for (index, id) in ids.iter().enumerate() {
        update.execute(params![index as i64, id])?;
    }
    Ok(())
}

#[async_trait]
impl LibraryStore for SqliteLibraryStore {
    async fn get_user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        self.db.with_read(|conn| get_user_by_id_sync(conn, user_id))
    }

    async fn get_user_by_account(&self, account: &str) -> Result<Option<User>> {
        self.db
            .with_read(|conn| get_user_by_account_sync(conn, account))
    }

    async fn create_user(
        &self,
        account: &str,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User> {
        self.db.with_write(|conn| {
            let now = now_iso();
            conn.execute(
                "INSERT INTO users (email, password_hash, role, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?4)",
                params![account, password_hash, role.as_str(), now],
            )
            .with_context(|| format!("Failed to create user {}", account))?;
            let id = conn.last_insert_rowid();
            get_user_by_id_sync(conn, id)?.context("User row missing right after insert")
        })
    }

    async fn upsert_user_by_account(
        &self,
        account: &str,
        password_hash: &str,
        role: UserRole,
    ) -> Result<User> {
        self.db.with_write(|conn| {
            let now = now_iso();
            match get_user_by_account_sync(conn, account)? {
                Some(existing) => {
                    conn.execute(
                        "UPDATE users
                         SET password_hash = ?1, role = ?2, is_active = 1, updated_at = ?3
                         WHERE id = ?4",
                        params![password_hash, role.as_str(), now, existing.id],
                    )?;
                    get_user_by_id_sync(conn, existing.id)?
                        .context("User row missing right after update")
                }
                None => {
                    conn.execute(
                        "INSERT INTO users (email, password_hash, role, is_active, created_at, updated_at)
                         VALUES (?1, ?2, ?3, 1, ?4, ?4)",
                        params![account, password_hash, role.as_str(), now],
                    )?;
                    let id = conn.last_insert_rowid();
                    get_user_by_id_sync(conn, id)?.context("User row missing right after insert")
                }
            }
        })
    }

    async fn create_auth_session(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: &str,
    ) -> Result<()> {
        self.db.with_write(|conn| {
            conn.execute(
                "INSERT INTO auth_sessions (user_id, token_hash, expires_at) VALUES (?1, ?2, ?3)",
                params![user_id, token_hash, expires_at],
            )?;
            Ok(())
        })
    }

    async fn delete_auth_session(&self, token_hash: &str) -> Result<()> {
        self.db.with_write(|conn| {
            conn.execute(
                "DELETE FROM auth_sessions WHERE token_hash = ?1",
                params![token_hash],
            )?;
            Ok(())
        })
    }

    async fn delete_expired_sessions(&self) -> Result<()> {
        self.db.with_write(|conn| {
            conn.execute(
                "DELETE FROM auth_sessions WHERE expires_at <= ?1",
                params![now_iso()],
            )?;
            Ok(())
        })
    }

    async fn get_session_user(&self, token_hash: &str) -> Result<Option<SessionUser>> {
        self.db.with_write(|conn| {
            // Expired rows are swept in the same pass as the lookup
            conn.execute(
                "DELETE FROM auth_sessions WHERE expires_at <= ?1",
                params![now_iso()],
            )?;

            let row = conn
                .query_row(
                    &format!(
                        "SELECT {}, s.expires_at
                         FROM auth_sessions s
                         JOIN users u ON u.id = s.user_id
                         WHERE s.token_hash = ?1
                         LIMIT 1",
                        USER_COLUMNS
                            .split(", ")
                            .map(|c| format!("u.{}", c))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                    params![token_hash],
                    |row| {
                        let user = map_user_row(row)?;
                        let expires_at: String = row.get(7)?;
                        Ok((user, expires_at))
                    },
                )
                .optional()?;

            Ok(match row {
                Some((user, expires_at)) if user.is_active => Some(SessionUser {
                    user,
                    session_expires_at: expires_at,
                }),
                _ => None,
            })
        })
    }

    async fn list_favorite_songs(&self, user_id: i64) -> Result<Vec<FavoriteSong>> {
        self.db.with_read(|conn| {
            let favorites = conn
                .prepare(
                    "SELECT song_id, song_title, album_name, created_at
                     FROM favorite_songs
                     WHERE user_id = ?1
                     ORDER BY created_at DESC",
                )?
                .query_map(params![user_id], |row| {
                    Ok(FavoriteSong {
                        song_id: row.get(0)?,
                        song_title: row.get(1)?,
                        album_name: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(favorites)
        })
    }

    async fn add_favorite_song(&self, favorite: &NewFavorite) -> Result<()> {
        self.db.with_write(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO favorite_songs (user_id, song_id, song_title, album_name)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    favorite.user_id,
                    favorite.song_id,
                    favorite.song_title,
                    favorite.album_name
                ],
            )?;
            Ok(())
        })
    }

    async fn remove_favorite_song(&self, user_id: i64, song_id: &str) -> Result<()> {
        self.db.with_write(|conn| {
            conn.execute(
                "DELETE FROM favorite_songs WHERE user_id = ?1 AND song_id = ?2",
                params![user_id, song_id],
            )?;
            Ok(())
        })
    }

    async fn list_playlist_items(
        &self,
        user_id: i64,
        playlist_id: &str,
    ) -> Result<Vec<PlaylistItem>> {
        self.db.with_read(|conn| {
            let items = conn
                .prepare(
                    "SELECT song_id, song_title, album_name, position, created_at
                     FROM playlist_items
                     WHERE user_id = ?1 AND playlist_id = ?2
                     ORDER BY position ASC, id ASC",
                )?
                .query_map(params![user_id, playlist_id], |row| {
                    Ok(PlaylistItem {
                        song_id: row.get(0)?,
                        song_title: row.get(1)?,
                        album_name: row.get(2)?,
                        position: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
    }

    async fn add_playlist_item(&self, item: &NewPlaylistItem) -> Result<bool> {
        self.db.with_write(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let exists = tx
                .query_row(
                    "SELECT 1 FROM playlist_items
                     WHERE user_id = ?1 AND playlist_id = ?2 AND song_id = ?3
                     LIMIT 1",
                    params![item.user_id, item.playlist_id, item.song_id],
                    |_| Ok(()),
                )
                .optional()?;
            if exists.is_some() {
                tx.commit()?;
                return Ok(false);
            }

            let next_position: i64 = tx.query_row(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM playlist_items
                 WHERE user_id = ?1 AND playlist_id = ?2",
                params![item.user_id, item.playlist_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO playlist_items
                 (user_id, playlist_id, song_id, song_title, album_name, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    item.user_id,
                    item.playlist_id,
                    item.song_id,
                    item.song_title,
                    item.album_name,
                    next_position
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    async fn remove_playlist_item(
        &self,
        user_id: i64,
        playlist_id: &str,
        song_id: &str,
    ) -> Result<()> {
        self.db.with_write(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "DELETE FROM playlist_items
                 WHERE user_id = ?1 AND playlist_id = ?2 AND song_id = ?3",
                params![user_id, playlist_id, song_id],
            )?;
            compact_playlist_positions(&tx, user_id, playlist_id)?;
            tx.commit()?;
            Ok(())
        })
    }

    async fn reorder_playlist_items(
        &self,
        user_id: i64,
        playlist_id: &str,
        song_ids: &[String],
    ) -> Result<bool> {
        self.db.with_write(|conn| {
            let existing: Vec<String> = conn
                .prepare(
                    "SELECT song_id FROM playlist_items
                     WHERE user_id = ?1 AND playlist_id = ?2",
                )?
                .query_map(params![user_id, playlist_id], |row| row.get(0))?
                .collect::<Result<_, _>>()?;

            if existing.len() != song_ids.len() {
                return Ok(false);
            }
            let existing_set: HashSet<&str> = existing.iter().map(String::as_str).collect();
            if !song_ids.iter().all(|id| existing_set.contains(id.as_str())) {
                return Ok(false);
            }

            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            {
                let mut update = tx.prepare(
                    "UPDATE playlist_items SET position = ?1
                     WHERE user_id = ?2 AND playlist_id = ?3 AND song_id = ?4",
                )?;
                for (index, song_id) in song_ids.iter().enumerate() {
                    update.execute(params![index as i64, user_id, playlist_id, song_id])?;
                }
            }
            tx.commit()?;
            Ok(true)
        })
    }

    async fn replace_playlist_items(
        &self,
        user_id: i64,
        playlist_id: &str,
        items: &[PlaylistItem],
    ) -> Result<()> {
        self.db.with_write(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "DELETE FROM playlist_items WHERE user_id = ?1 AND playlist_id = ?2",
                params![user_id, playlist_id],
            )?;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO playlist_items
                     (user_id, playlist_id, song_id, song_title, album_name, position, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for item in items {
                    insert.execute(params![
                        user_id,
                        playlist_id,
                        item.song_id,
                        item.song_title,
                        item.album_name,
                        item.position,
                        item.created_at
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::models::DEFAULT_PLAYLIST_ID;
    use crate::sqlite_persistence::VERSIONED_SCHEMAS;
    use tempfile::TempDir;

    fn create_tmp_store() -> (SqliteLibraryStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = EmbeddedDb::open(vec![temp_dir.path().join("test.db")], VERSIONED_SCHEMAS).unwrap();
        (SqliteLibraryStore::new(Arc::new(db)), temp_dir)
    }

    async fn create_test_user(store: &SqliteLibraryStore) -> User {
        store
            .create_user("someone@example.com", "hash", UserRole::User)
            .await
            .unwrap()
    }

    fn new_item(user_id: i64, song_id: &str) -> NewPlaylistItem {
        NewPlaylistItem {
            user_id,
            playlist_id: DEFAULT_PLAYLIST_ID.to_string(),
            song_id: song_id.to_string(),
            song_title: format!("title {}", song_id),
            album_name: "album".to_string(),
        }
    }

    async fn positions(store: &SqliteLibraryStore, user_id: i64) -> Vec<(String, i64)> {
        store
            .list_playlist_items(user_id, DEFAULT_PLAYLIST_ID)
            .await
            .unwrap()
            .into_iter()
            .map(|item| (item.song_id, item.position))
            .collect()
    }

    #[tokio::test]
    async fn creates_and_finds_users() {
        let (store, _tmp) = create_tmp_store();
        let user = create_test_user(&store).await;
        assert_eq!(user.id, 1);
        assert!(user.is_active);

        let found = store
            .get_user_by_account("someone@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);

        let duplicate = store
            .create_user("someone@example.com", "other", UserRole::User)
            .await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn upsert_updates_in_place() {
        let (store, _tmp) = create_tmp_store();
        let user = create_test_user(&store).await;

        let updated = store
            .upsert_user_by_account("someone@example.com", "newhash", UserRole::Admin)
            .await
            .unwrap();
        assert_eq!(updated.id, user.id);
        assert_eq!(updated.password_hash, "newhash");
        assert_eq!(updated.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn favorite_add_is_idempotent() {
        let (store, _tmp) = create_tmp_store();
        let user = create_test_user(&store).await;

        let favorite = NewFavorite {
            user_id: user.id,
            song_id: "song-1".to_string(),
            song_title: "Song".to_string(),
            album_name: "Album".to_string(),
        };
        store.add_favorite_song(&favorite).await.unwrap();
        store.add_favorite_song(&favorite).await.unwrap();

        let favorites = store.list_favorite_songs(user.id).await.unwrap();
        assert_eq!(favorites.len(), 1);

        store.remove_favorite_song(user.id, "song-1").await.unwrap();
        store.remove_favorite_song(user.id, "song-1").await.unwrap();
        assert!(store.list_favorite_songs(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn playlist_positions_stay_dense() {
        let (store, _tmp) = create_tmp_store();
        let user = create_test_user(&store).await;

        for song in ["a", "b", "c", "d"] {
            assert!(store.add_playlist_item(&new_item(user.id, song)).await.unwrap());
        }
        // duplicate add is refused without disturbing order
        assert!(!store.add_playlist_item(&new_item(user.id, "b")).await.unwrap());

        store
            .remove_playlist_item(user.id, DEFAULT_PLAYLIST_ID, "b")
            .await
            .unwrap();

        assert_eq!(
            positions(&store, user.id).await,
            vec![
                ("a".to_string(), 0),
                ("c".to_string(), 1),
                ("d".to_string(), 2)
            ]
        );

        store
            .remove_playlist_item(user.id, DEFAULT_PLAYLIST_ID, "a")
            .await
            .unwrap();
        assert_eq!(
            positions(&store, user.id).await,
            vec![("c".to_string(), 0), ("d".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn reorder_requires_exact_song_set() {
        let (store, _tmp) = create_tmp_store();
        let user = create_test_user(&store).await;
        for song in ["a", "b", "c"] {
            store.add_playlist_item(&new_item(user.id, song)).await.unwrap();
        }

        // missing an id
        let rejected = store
            .reorder_playlist_items(
                user.id,
                DEFAULT_PLAYLIST_ID,
                &["a".to_string(), "b".to_string()],
            )
            .await
            .unwrap();
        assert!(!rejected);

        // unknown id
        let rejected = store
            .reorder_playlist_items(
                user.id,
                DEFAULT_PLAYLIST_ID,
                &["a".to_string(), "b".to_string(), "x".to_string()],
            )
            .await
            .unwrap();
        assert!(!rejected);

        // order unchanged after the rejections
        assert_eq!(
            positions(&store, user.id).await,
            vec![
                ("a".to_string(), 0),
                ("b".to_string(), 1),
                ("c".to_string(), 2)
            ]
        );

        let applied = store
            .reorder_playlist_items(
                user.id,
                DEFAULT_PLAYLIST_ID,
                &["c".to_string(), "a".to_string(), "b".to_string()],
            )
            .await
            .unwrap();
        assert!(applied);
        assert_eq!(
            positions(&store, user.id).await,
            vec![
                ("c".to_string(), 0),
                ("a".to_string(), 1),
                ("b".to_string(), 2)
            ]
        );
    }

    #[tokio::test]
    async fn replace_playlist_converges_on_rerun() {
        let (store, _tmp) = create_tmp_store();
        let user = create_test_user(&store).await;
        store.add_playlist_item(&new_item(user.id, "old")).await.unwrap();

        let snapshot = vec![
            PlaylistItem {
                song_id: "x".to_string(),
                song_title: "X".to_string(),
                album_name: "Album".to_string(),
                position: 0,
                created_at: now_iso(),
            },
            PlaylistItem {
                song_id: "y".to_string(),
                song_title: "Y".to_string(),
                album_name: "Album".to_string(),
                position: 1,
                created_at: now_iso(),
            },
        ];
        store
            .replace_playlist_items(user.id, DEFAULT_PLAYLIST_ID, &snapshot)
            .await
            .unwrap();
        store
            .replace_playlist_items(user.id, DEFAULT_PLAYLIST_ID, &snapshot)
            .await
            .unwrap();

        assert_eq!(
            positions(&store, user.id).await,
            vec![("x".to_string(), 0), ("y".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn expired_session_lookup_deletes_the_row() {
        let (store, _tmp) = create_tmp_store();
        let user = create_test_user(&store).await;

        store
            .create_auth_session(user.id, "expired-hash", "2000-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert!(store.get_session_user("expired-hash").await.unwrap().is_none());

        // the expired row is gone, so a fresh insert with the same hash works
        store
            .create_auth_session(user.id, "expired-hash", "2999-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert!(store.get_session_user("expired-hash").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn valid_session_resolves_user() {
        let (store, _tmp) = create_tmp_store();
        let user = create_test_user(&store).await;

        store
            .create_auth_session(user.id, "token-hash", "2999-01-01T00:00:00.000Z")
            .await
            .unwrap();
        let session = store.get_session_user("token-hash").await.unwrap().unwrap();
        assert_eq!(session.user.id, user.id);
        assert_eq!(session.session_expires_at, "2999-01-01T00:00:00.000Z");

        store.delete_auth_session("token-hash").await.unwrap();
        assert!(store.get_session_user("token-hash").await.unwrap().is_none());
    }
}
