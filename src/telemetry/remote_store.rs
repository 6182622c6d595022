use super::models::{
    MigrateLogsOutcome, NewPlaybackLog, PlaybackStats, StatsScope, QUALIFIED_PLAY_SECONDS,
};
use super::stats::{build_stats, StatsSourceRow};
use super::store::TelemetryStore;
use crate::library::models::now_iso;
use crate::supabase::{Filter, SupabaseClient};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

const STATS_SELECT: &str = "id,song_id,song_title,album_name,event,played_seconds,created_at";
const STATS_BATCH_SIZE: u64 = 1000;

/// Playback telemetry over the remote REST store. Stats page the full log in
/// id-keyed batches and aggregate in memory, since the REST surface has no
/// grouped aggregation.
pub struct RemoteTelemetryStore {
    client: Arc<SupabaseClient>,
}

impl RemoteTelemetryStore {
    pub fn new(client: Arc<SupabaseClient>) -> RemoteTelemetryStore {
        RemoteTelemetryStore { client }
    }
}

fn scope_filters(scope: StatsScope) -> Vec<Filter> {
    match scope {
        StatsScope::User(user_id) => vec![Filter::eq("user_id", user_id)],
        StatsScope::Registered => vec![Filter::not_null("user_id")],
        StatsScope::Everyone => Vec::new(),
    }
}

#[async_trait]
impl TelemetryStore for RemoteTelemetryStore {
    async fn insert_playback_log(&self, entry: &NewPlaybackLog) -> Result<()> {
        let next_id = self.client.next_table_id("playback_logs").await?;
        let _: Vec<serde_json::Value> = self
            .client
            .insert_rows(
                "playback_logs",
                &[json!({
                    "id": next_id,
                    "session_id": entry.session_id,
                    "song_id": entry.song_id,
                    "song_title": entry.song_title,
                    "album_name": entry.album_name,
                    "event": entry.event.as_str(),
                    "position_seconds": entry.position_seconds,
                    "played_seconds": entry.played_seconds,
                    "duration_seconds": entry.duration_seconds,
                    "pathname": entry.pathname,
                    "user_agent": entry.user_agent,
                    "user_id": entry.user_id,
                    "created_at": now_iso(),
                })],
            )
            .await?;
        Ok(())
    }

    async fn playback_stats(&self, scope: StatsScope) -> Result<PlaybackStats> {
        let rows: Vec<StatsSourceRow> = self
            .client
            .fetch_all_rows(
                "playback_logs",
                &scope_filters(scope),
                STATS_SELECT,
                STATS_BATCH_SIZE,
            )
            .await?;
        Ok(build_stats(&rows, QUALIFIED_PLAY_SECONDS))
    }

    async fn migrate_anonymous_logs(&self, user_id: i64) -> Result<MigrateLogsOutcome> {
        let anonymous = [Filter::is_null("user_id")];
        let before = self.client.count_rows("playback_logs", &anonymous).await?;
        self.client
            .patch_rows("playback_logs", &json!({ "user_id": user_id }), &anonymous)
            .await?;
        let after = self.client.count_rows("playback_logs", &anonymous).await?;
        Ok(MigrateLogsOutcome {
            migrated_count: before.saturating_sub(after),
            remaining_null_count: after,
        })
    }
}
