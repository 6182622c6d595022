//! Library data models

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Items added without an explicit playlist land in the well-known
/// "listen later" playlist.
pub const DEFAULT_PLAYLIST_ID: &str = "later";

/// Millisecond-precision UTC ISO-8601, the same shape SQLite's STRFTIME
/// default produces. Lexicographic order equals chronological order.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accounts are email-like and compared case-insensitively.
pub fn normalize_account(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn normalize_playlist_id(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_string(),
        _ => DEFAULT_PLAYLIST_ID.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    /// Unknown role strings degrade to the regular user role.
    pub fn parse(s: &str) -> UserRole {
        match s {
            "admin" => UserRole::Admin,
            _ => UserRole::User,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    /// Salted hash; stays inside the persistence engine, verification only.
    #[serde(skip_serializing)]
    pub password_hash: String,
}

/// A resolved session: the owning user plus the session row's expiry.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user: User,
    pub session_expires_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteSong {
    pub song_id: String,
    pub song_title: String,
    pub album_name: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewFavorite {
    pub user_id: i64,
    pub song_id: String,
    pub song_title: String,
    pub album_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItem {
    pub song_id: String,
    pub song_title: String,
    pub album_name: String,
    pub position: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewPlaylistItem {
    pub user_id: i64,
    pub playlist_id: String,
    pub song_id: String,
    pub song_title: String,
    pub album_name: String,
}
