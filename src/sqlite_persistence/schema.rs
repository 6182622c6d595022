//! Versioned schema for the embedded player database.
//!
//! A single SQLite file holds the whole library (users, sessions, favorites,
//! playlists) and the playback telemetry log. V1 added the nullable
//! `playback_logs.user_id` column once playback events became attributable
//! to signed-in users.

use super::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};
use crate::sqlite_column;
use rusqlite::Connection;

const USER_FK: ForeignKey = ForeignKey {
    foreign_table: "users",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

pub const USERS_TABLE: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("email", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("password_hash", &SqlType::Text, non_null = true),
        sqlite_column!(
            "role",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'user'")
        ),
        sqlite_column!(
            "is_active",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[("idx_users_email", "email")],
};

pub const AUTH_SESSIONS_TABLE: Table = Table {
    name: "auth_sessions",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!(
            "token_hash",
            &SqlType::Text,
            non_null = true,
            is_unique = true
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("expires_at", &SqlType::Text, non_null = true),
    ],
    unique_constraints: &[],
    indices: &[
        ("idx_auth_sessions_user", "user_id"),
        ("idx_auth_sessions_expire", "expires_at"),
    ],
};

pub const FAVORITE_SONGS_TABLE: Table = Table {
    name: "favorite_songs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("song_id", &SqlType::Text, non_null = true),
        sqlite_column!("song_title", &SqlType::Text, non_null = true),
        sqlite_column!("album_name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[&["user_id", "song_id"]],
    indices: &[("idx_favorite_songs_user_created", "user_id, created_at")],
};

pub const PLAYLIST_ITEMS_TABLE: Table = Table {
    name: "playlist_items",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("playlist_id", &SqlType::Text, non_null = true),
        sqlite_column!("song_id", &SqlType::Text, non_null = true),
        sqlite_column!("song_title", &SqlType::Text, non_null = true),
        sqlite_column!("album_name", &SqlType::Text, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[&["user_id", "playlist_id", "song_id"]],
    indices: &[(
        "idx_playlist_items_user_playlist_pos",
        "user_id, playlist_id, position",
    )],
};

/// V0: playback logs were anonymous, there was no user_id column yet.
const PLAYBACK_LOGS_TABLE_V_0: Table = Table {
    name: "playback_logs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("session_id", &SqlType::Text, non_null = true),
        sqlite_column!("song_id", &SqlType::Text, non_null = true),
        sqlite_column!("song_title", &SqlType::Text, non_null = true),
        sqlite_column!("album_name", &SqlType::Text, non_null = true),
        sqlite_column!("event", &SqlType::Text, non_null = true),
        sqlite_column!(
            "position_seconds",
            &SqlType::Real,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "played_seconds",
            &SqlType::Real,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("duration_seconds", &SqlType::Real),
        sqlite_column!(
            "pathname",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "user_agent",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[
        ("idx_playback_logs_song_created_at", "song_id, created_at"),
        ("idx_playback_logs_event_created_at", "event, created_at"),
    ],
};

/// V1: user_id is appended last because ALTER TABLE ADD COLUMN appends.
pub const PLAYBACK_LOGS_TABLE: Table = Table {
    name: "playback_logs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("session_id", &SqlType::Text, non_null = true),
        sqlite_column!("song_id", &SqlType::Text, non_null = true),
        sqlite_column!("song_title", &SqlType::Text, non_null = true),
        sqlite_column!("album_name", &SqlType::Text, non_null = true),
        sqlite_column!("event", &SqlType::Text, non_null = true),
        sqlite_column!(
            "position_seconds",
            &SqlType::Real,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "played_seconds",
            &SqlType::Real,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("duration_seconds", &SqlType::Real),
        sqlite_column!(
            "pathname",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "user_agent",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("user_id", &SqlType::Integer),
    ],
    unique_constraints: &[],
    indices: &[
        ("idx_playback_logs_song_created_at", "song_id, created_at"),
        ("idx_playback_logs_event_created_at", "event, created_at"),
        ("idx_playback_logs_user_created_at", "user_id, created_at"),
    ],
};

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            USERS_TABLE,
            AUTH_SESSIONS_TABLE,
            FAVORITE_SONGS_TABLE,
            PLAYLIST_ITEMS_TABLE,
            PLAYBACK_LOGS_TABLE_V_0,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            USERS_TABLE,
            AUTH_SESSIONS_TABLE,
            FAVORITE_SONGS_TABLE,
            PLAYLIST_ITEMS_TABLE,
            PLAYBACK_LOGS_TABLE,
        ],
        migration: Some(|conn: &Connection| {
            conn.execute("ALTER TABLE playback_logs ADD COLUMN user_id INTEGER", [])?;
            conn.execute(
                "CREATE INDEX idx_playback_logs_user_created_at ON playback_logs(user_id, created_at)",
                [],
            )?;
            Ok(())
        }),
    },
];
