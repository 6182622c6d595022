use super::models::{MigrateLogsOutcome, NewPlaybackLog, PlaybackStats, StatsScope};
use anyhow::Result;
use async_trait::async_trait;

/// Storage contract for playback telemetry, implemented by both backends.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Pure append. Rows are never updated or deleted by normal operation.
    async fn insert_playback_log(&self, entry: &NewPlaybackLog) -> Result<()>;

    /// Aggregates over terminating events only.
    async fn playback_stats(&self, scope: StatsScope) -> Result<PlaybackStats>;

    /// Claims anonymous rows (user_id IS NULL) for the given user.
    async fn migrate_anonymous_logs(&self, user_id: i64) -> Result<MigrateLogsOutcome>;
}
