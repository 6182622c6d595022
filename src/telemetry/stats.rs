//! In-memory aggregation of playback log rows.
//!
//! The embedded store aggregates in SQL; the remote store pages raw rows and
//! folds them here. Both produce the same `PlaybackStats` shape: terminating
//! events only, qualified plays against the threshold, and rollups sorted by
//! total played time, then qualified plays, then most recent activity.

use super::models::{AlbumStats, PlaybackEvent, PlaybackStats, SongStats, StatsSummary};
use chrono::DateTime;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// The projection fetched from the remote store for aggregation.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsSourceRow {
    pub song_id: String,
    pub song_title: String,
    pub album_name: String,
    pub event: String,
    pub played_seconds: Option<f64>,
    pub created_at: Option<String>,
}

fn timestamp_millis(value: &Option<String>) -> i64 {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

fn later_of(current: Option<String>, candidate: &Option<String>) -> Option<String> {
    if timestamp_millis(candidate) > timestamp_millis(&current) {
        candidate.clone()
    } else {
        current
    }
}

fn metric_order(
    total_a: f64,
    plays_a: u64,
    last_a: &Option<String>,
    total_b: f64,
    plays_b: u64,
    last_b: &Option<String>,
) -> Ordering {
    total_b
        .total_cmp(&total_a)
        .then_with(|| plays_b.cmp(&plays_a))
        .then_with(|| timestamp_millis(last_b).cmp(&timestamp_millis(last_a)))
}

struct SongAccumulator {
    song_id: String,
    song_title: String,
    album_name: String,
    total_played_seconds: f64,
    sessions: u64,
    play_count: u64,
    last_played_at: Option<String>,
}

struct AlbumAccumulator {
    album_name: String,
    total_played_seconds: f64,
    sessions: u64,
    play_count: u64,
    song_ids: HashSet<String>,
    last_played_at: Option<String>,
}

pub fn build_stats(rows: &[StatsSourceRow], threshold_seconds: f64) -> PlaybackStats {
    let mut summary = StatsSummary {
        total_played_seconds: 0.0,
        sessions: 0,
        play_count: 0,
        song_count: 0,
        album_count: 0,
    };
    let mut songs: HashMap<(String, String, String), SongAccumulator> = HashMap::new();
    let mut albums: HashMap<String, AlbumAccumulator> = HashMap::new();

    for row in rows {
        let terminating = PlaybackEvent::parse(&row.event)
            .map(|event| event.is_terminating())
            .unwrap_or(false);
        if !terminating {
            continue;
        }

        let played_seconds = row.played_seconds.unwrap_or(0.0);
        let qualified = played_seconds >= threshold_seconds;

        summary.total_played_seconds += played_seconds;
        summary.sessions += 1;
        if qualified {
            summary.play_count += 1;
        }

        let song_key = (
            row.song_id.clone(),
            row.song_title.clone(),
            row.album_name.clone(),
        );
        let song = songs.entry(song_key).or_insert_with(|| SongAccumulator {
            song_id: row.song_id.clone(),
            song_title: row.song_title.clone(),
            album_name: row.album_name.clone(),
            total_played_seconds: 0.0,
            sessions: 0,
            play_count: 0,
            last_played_at: None,
        });
        song.total_played_seconds += played_seconds;
        song.sessions += 1;
        if qualified {
            song.play_count += 1;
        }
        song.last_played_at = later_of(song.last_played_at.take(), &row.created_at);

        let album = albums
            .entry(row.album_name.clone())
            .or_insert_with(|| AlbumAccumulator {
                album_name: row.album_name.clone(),
                total_played_seconds: 0.0,
                sessions: 0,
                play_count: 0,
                song_ids: HashSet::new(),
                last_played_at: None,
            });
        album.total_played_seconds += played_seconds;
        album.sessions += 1;
        if qualified {
            album.play_count += 1;
        }
        album.song_ids.insert(row.song_id.clone());
        album.last_played_at = later_of(album.last_played_at.take(), &row.created_at);
    }

    summary.song_count = songs.len() as u64;
    summary.album_count = albums.len() as u64;

    let mut song_stats: Vec<SongStats> = songs
        .into_values()
        .map(|acc| SongStats {
            song_id: acc.song_id,
            song_title: acc.song_title,
            album_name: acc.album_name,
            total_played_seconds: acc.total_played_seconds,
            sessions: acc.sessions,
            play_count: acc.play_count,
            avg_session_seconds: acc.total_played_seconds / acc.sessions as f64,
            last_played_at: acc.last_played_at,
        })
        .collect();
    song_stats.sort_by(|a, b| {
        metric_order(
            a.total_played_seconds,
            a.play_count,
            &a.last_played_at,
            b.total_played_seconds,
            b.play_count,
            &b.last_played_at,
        )
    });

    let mut album_stats: Vec<AlbumStats> = albums
        .into_values()
        .map(|acc| AlbumStats {
            album_name: acc.album_name,
            total_played_seconds: acc.total_played_seconds,
            sessions: acc.sessions,
            play_count: acc.play_count,
            song_count: acc.song_ids.len() as u64,
            last_played_at: acc.last_played_at,
        })
        .collect();
    album_stats.sort_by(|a, b| {
        metric_order(
            a.total_played_seconds,
            a.play_count,
            &a.last_played_at,
            b.total_played_seconds,
            b.play_count,
            &b.last_played_at,
        )
    });

    PlaybackStats {
        threshold_seconds,
        summary,
        songs: song_stats,
        albums: album_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::models::QUALIFIED_PLAY_SECONDS;

    fn row(song: &str, album: &str, event: &str, played: f64, at: &str) -> StatsSourceRow {
        StatsSourceRow {
            song_id: song.to_string(),
            song_title: format!("title {}", song),
            album_name: album.to_string(),
            event: event.to_string(),
            played_seconds: Some(played),
            created_at: Some(at.to_string()),
        }
    }

    #[test]
    fn pause_after_42_seconds_is_a_qualified_play() {
        let rows = vec![
            row("s1", "alb", "play", 0.0, "2024-01-01T00:00:00Z"),
            row("s1", "alb", "pause", 42.0, "2024-01-01T00:00:42Z"),
        ];
        let stats = build_stats(&rows, QUALIFIED_PLAY_SECONDS);
        assert_eq!(stats.summary.sessions, 1);
        assert_eq!(stats.summary.play_count, 1);
        assert!(stats.summary.total_played_seconds >= 42.0);
        assert_eq!(stats.summary.song_count, 1);
        assert_eq!(stats.summary.album_count, 1);
    }

    #[test]
    fn short_span_counts_as_session_but_not_play() {
        let rows = vec![
            row("s1", "alb", "play", 0.0, "2024-01-01T00:00:00Z"),
            row("s1", "alb", "page_hide", 10.0, "2024-01-01T00:00:10Z"),
        ];
        let stats = build_stats(&rows, QUALIFIED_PLAY_SECONDS);
        assert_eq!(stats.summary.sessions, 1);
        assert_eq!(stats.summary.play_count, 0);
    }

    #[test]
    fn play_events_carry_no_attribution() {
        let rows = vec![row("s1", "alb", "play", 500.0, "2024-01-01T00:00:00Z")];
        let stats = build_stats(&rows, QUALIFIED_PLAY_SECONDS);
        assert_eq!(stats.summary.sessions, 0);
        assert_eq!(stats.summary.total_played_seconds, 0.0);
        assert!(stats.songs.is_empty());
        assert!(stats.albums.is_empty());
    }

    #[test]
    fn rollups_sort_by_total_then_plays_then_recency() {
        let rows = vec![
            // song a: 100s total, 1 play
            row("a", "alb1", "ended", 100.0, "2024-01-01T00:00:00Z"),
            // song b: 100s total, 2 plays
            row("b", "alb2", "ended", 50.0, "2024-01-02T00:00:00Z"),
            row("b", "alb2", "ended", 50.0, "2024-01-02T01:00:00Z"),
            // song c: 200s total
            row("c", "alb3", "ended", 200.0, "2024-01-01T00:00:00Z"),
        ];
        let stats = build_stats(&rows, QUALIFIED_PLAY_SECONDS);
        let order: Vec<&str> = stats.songs.iter().map(|s| s.song_id.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn album_rollup_counts_distinct_songs() {
        let rows = vec![
            row("a", "alb", "ended", 40.0, "2024-01-01T00:00:00Z"),
            row("b", "alb", "ended", 40.0, "2024-01-01T01:00:00Z"),
            row("a", "alb", "ended", 40.0, "2024-01-01T02:00:00Z"),
        ];
        let stats = build_stats(&rows, QUALIFIED_PLAY_SECONDS);
        assert_eq!(stats.albums.len(), 1);
        assert_eq!(stats.albums[0].song_count, 2);
        assert_eq!(stats.albums[0].sessions, 3);
        assert_eq!(
            stats.albums[0].last_played_at.as_deref(),
            Some("2024-01-01T02:00:00Z")
        );
    }
}
