pub mod models;
mod remote_store;
mod service;
mod sqlite_store;
pub mod stats;
mod store;

pub use models::{
    MigrateLogsOutcome, NewPlaybackLog, PlaybackEvent, PlaybackStats, StatsScope,
    QUALIFIED_PLAY_SECONDS,
};
pub use remote_store::RemoteTelemetryStore;
pub use service::TelemetryService;
pub use sqlite_store::SqliteTelemetryStore;
pub use store::TelemetryStore;
