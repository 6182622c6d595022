use super::models::{
    AlbumStats, MigrateLogsOutcome, NewPlaybackLog, PlaybackStats, SongStats, StatsScope,
    StatsSummary, QUALIFIED_PLAY_SECONDS,
};
use super::store::TelemetryStore;
use crate::sqlite_persistence::EmbeddedDb;
use anyhow::Result;
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};
use std::sync::Arc;

/// SQL fragment listing the terminating events.
const END_EVENTS: &str = "'pause','ended','song_change','page_hide'";

/// Playback telemetry over the embedded SQLite database. Aggregation runs in
/// SQL so the unbounded log is never materialized in memory.
#[derive(Clone)]
pub struct SqliteTelemetryStore {
    db: Arc<EmbeddedDb>,
}

impl SqliteTelemetryStore {
    pub fn new(db: Arc<EmbeddedDb>) -> SqliteTelemetryStore {
        SqliteTelemetryStore { db }
    }
}

fn scope_clause(scope: StatsScope) -> (&'static str, Option<i64>) {
    match scope {
        StatsScope::User(user_id) => ("user_id = ?2", Some(user_id)),
        StatsScope::Registered => ("user_id IS NOT NULL", None),
        StatsScope::Everyone => ("1=1", None),
    }
}

#[async_trait]
impl TelemetryStore for SqliteTelemetryStore {
    async fn insert_playback_log(&self, entry: &NewPlaybackLog) -> Result<()> {
        self.db.with_write(|conn| {
            conn.execute(
                "INSERT INTO playback_logs
                 (session_id, song_id, song_title, album_name, event, position_seconds,
                  played_seconds, duration_seconds, pathname, user_agent, user_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    entry.session_id,
                    entry.song_id,
                    entry.song_title,
                    entry.album_name,
                    entry.event.as_str(),
                    entry.position_seconds,
                    entry.played_seconds,
                    entry.duration_seconds,
                    entry.pathname,
                    entry.user_agent,
                    entry.user_id,
                ],
            )?;
            Ok(())
        })
    }

    async fn playback_stats(&self, scope: StatsScope) -> Result<PlaybackStats> {
        let (where_clause, user_param) = scope_clause(scope);
        let mut query_params: Vec<Value> = vec![Value::from(QUALIFIED_PLAY_SECONDS)];
        if let Some(user_id) = user_param {
            query_params.push(Value::from(user_id));
        }

        self.db.with_read(|conn| {
            let summary = conn.query_row(
                &format!(
                    "SELECT
                       COALESCE(SUM(CASE WHEN event IN ({e}) THEN played_seconds ELSE 0 END), 0),
                       COALESCE(SUM(CASE WHEN event IN ({e}) THEN 1 ELSE 0 END), 0),
                       COALESCE(SUM(CASE WHEN event IN ({e}) AND played_seconds >= ?1 THEN 1 ELSE 0 END), 0),
                       COALESCE(COUNT(DISTINCT CASE WHEN event IN ({e}) THEN song_id END), 0),
                       COALESCE(COUNT(DISTINCT CASE WHEN event IN ({e}) THEN album_name END), 0)
                     FROM playback_logs
                     WHERE {w}",
                    e = END_EVENTS,
                    w = where_clause
                ),
                params_from_iter(query_params.iter()),
                |row| {
                    Ok(StatsSummary {
                        total_played_seconds: row.get(0)?,
                        sessions: row.get::<_, i64>(1)? as u64,
                        play_count: row.get::<_, i64>(2)? as u64,
                        song_count: row.get::<_, i64>(3)? as u64,
                        album_count: row.get::<_, i64>(4)? as u64,
                    })
                },
            )?;

            let songs = conn
                .prepare(&format!(
                    "SELECT
                       song_id, song_title, album_name,
                       SUM(CASE WHEN event IN ({e}) THEN played_seconds ELSE 0 END) AS total_played_seconds,
                       SUM(CASE WHEN event IN ({e}) THEN 1 ELSE 0 END) AS sessions,
                       SUM(CASE WHEN event IN ({e}) AND played_seconds >= ?1 THEN 1 ELSE 0 END) AS play_count,
                       AVG(CASE WHEN event IN ({e}) THEN played_seconds ELSE NULL END) AS avg_session_seconds,
                       MAX(created_at) AS last_played_at
                     FROM playback_logs
                     WHERE {w}
                     GROUP BY song_id, song_title, album_name
                     HAVING sessions > 0
                     ORDER BY total_played_seconds DESC, play_count DESC, last_played_at DESC",
                    e = END_EVENTS,
                    w = where_clause
                ))?
                .query_map(params_from_iter(query_params.iter()), |row| {
                    Ok(SongStats {
                        song_id: row.get(0)?,
                        song_title: row.get(1)?,
                        album_name: row.get(2)?,
                        total_played_seconds: row.get(3)?,
                        sessions: row.get::<_, i64>(4)? as u64,
                        play_count: row.get::<_, i64>(5)? as u64,
                        avg_session_seconds: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                        last_played_at: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let albums = conn
                .prepare(&format!(
                    "SELECT
                       album_name,
                       SUM(CASE WHEN event IN ({e}) THEN played_seconds ELSE 0 END) AS total_played_seconds,
                       SUM(CASE WHEN event IN ({e}) THEN 1 ELSE 0 END) AS sessions,
                       SUM(CASE WHEN event IN ({e}) AND played_seconds >= ?1 THEN 1 ELSE 0 END) AS play_count,
                       COUNT(DISTINCT CASE WHEN event IN ({e}) THEN song_id END) AS song_count,
                       MAX(created_at) AS last_played_at
                     FROM playback_logs
                     WHERE {w}
                     GROUP BY album_name
                     HAVING sessions > 0
                     ORDER BY total_played_seconds DESC, play_count DESC, last_played_at DESC",
                    e = END_EVENTS,
                    w = where_clause
                ))?
                .query_map(params_from_iter(query_params.iter()), |row| {
                    Ok(AlbumStats {
                        album_name: row.get(0)?,
                        total_played_seconds: row.get(1)?,
                        sessions: row.get::<_, i64>(2)? as u64,
                        play_count: row.get::<_, i64>(3)? as u64,
                        song_count: row.get::<_, i64>(4)? as u64,
                        last_played_at: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(PlaybackStats {
                threshold_seconds: QUALIFIED_PLAY_SECONDS,
                summary,
                songs,
                albums,
            })
        })
    }

    async fn migrate_anonymous_logs(&self, user_id: i64) -> Result<MigrateLogsOutcome> {
        self.db.with_write(|conn| {
            let before: i64 = conn.query_row(
                "SELECT COUNT(*) FROM playback_logs WHERE user_id IS NULL",
                [],
                |row| row.get(0),
            )?;
            conn.execute(
                "UPDATE playback_logs SET user_id = ?1 WHERE user_id IS NULL",
                params![user_id],
            )?;
            let after: i64 = conn.query_row(
                "SELECT COUNT(*) FROM playback_logs WHERE user_id IS NULL",
                [],
                |row| row.get(0),
            )?;
            Ok(MigrateLogsOutcome {
                migrated_count: (before - after).max(0) as u64,
                remaining_null_count: after.max(0) as u64,
            })
        })
    }
}
