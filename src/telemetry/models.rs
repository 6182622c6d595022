//! Playback telemetry models

use serde::{Deserialize, Serialize};

/// A listening span shorter than this does not count as a play.
pub const QUALIFIED_PLAY_SECONDS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEvent {
    Play,
    Pause,
    Ended,
    SongChange,
    PageHide,
}

impl PlaybackEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackEvent::Play => "play",
            PlaybackEvent::Pause => "pause",
            PlaybackEvent::Ended => "ended",
            PlaybackEvent::SongChange => "song_change",
            PlaybackEvent::PageHide => "page_hide",
        }
    }

    pub fn parse(s: &str) -> Option<PlaybackEvent> {
        match s {
            "play" => Some(PlaybackEvent::Play),
            "pause" => Some(PlaybackEvent::Pause),
            "ended" => Some(PlaybackEvent::Ended),
            "song_change" => Some(PlaybackEvent::SongChange),
            "page_hide" => Some(PlaybackEvent::PageHide),
            _ => None,
        }
    }

    /// Terminating events close a listening span and carry its
    /// played-seconds attribution; `play` only opens one.
    pub fn is_terminating(&self) -> bool {
        !matches!(self, PlaybackEvent::Play)
    }
}

/// Append-only playback log entry. `session_id` is a client-generated
/// correlation id, unrelated to auth sessions.
#[derive(Debug, Clone)]
pub struct NewPlaybackLog {
    pub session_id: String,
    pub song_id: String,
    pub song_title: String,
    pub album_name: String,
    pub event: PlaybackEvent,
    pub position_seconds: f64,
    pub played_seconds: f64,
    pub duration_seconds: Option<f64>,
    pub pathname: String,
    pub user_agent: String,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
pub enum StatsScope {
    /// A single user's events.
    User(i64),
    /// All non-anonymous users.
    Registered,
    /// Everything, anonymous events included.
    Everyone,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_played_seconds: f64,
    pub sessions: u64,
    pub play_count: u64,
    pub song_count: u64,
    pub album_count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongStats {
    pub song_id: String,
    pub song_title: String,
    pub album_name: String,
    pub total_played_seconds: f64,
    pub sessions: u64,
    pub play_count: u64,
    pub avg_session_seconds: f64,
    pub last_played_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumStats {
    pub album_name: String,
    pub total_played_seconds: f64,
    pub sessions: u64,
    pub play_count: u64,
    pub song_count: u64,
    pub last_played_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStats {
    pub threshold_seconds: f64,
    pub summary: StatsSummary,
    pub songs: Vec<SongStats>,
    pub albums: Vec<AlbumStats>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateLogsOutcome {
    pub migrated_count: u64,
    pub remaining_null_count: u64,
}
