use crate::config::AppConfig;
use crate::library::LibraryService;
use crate::sqlite_persistence::EmbeddedDb;
use crate::telemetry::TelemetryService;
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub library: Arc<LibraryService>,
    pub telemetry: Arc<TelemetryService>,
    pub db: Arc<EmbeddedDb>,
    /// Shared client for cloud asset fetches.
    pub assets_http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        library: Arc<LibraryService>,
        telemetry: Arc<TelemetryService>,
        db: Arc<EmbeddedDb>,
    ) -> AppState {
        AppState {
            config,
            library,
            telemetry,
            db,
            assets_http: reqwest::Client::new(),
        }
    }
}

impl FromRef<AppState> for Arc<LibraryService> {
    fn from_ref(input: &AppState) -> Self {
        input.library.clone()
    }
}

impl FromRef<AppState> for Arc<TelemetryService> {
    fn from_ref(input: &AppState) -> Self {
        input.telemetry.clone()
    }
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(input: &AppState) -> Self {
        input.config.clone()
    }
}
