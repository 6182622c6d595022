mod auth_routes;
mod errors;
mod library_routes;
pub mod media;
pub mod metrics;
mod playback_routes;
mod requests_logging;
pub mod session;
mod state;
mod stream_audio;

pub use requests_logging::RequestsLoggingLevel;
pub use session::AUTH_COOKIE_NAME;
pub use state::AppState;

use anyhow::Result;
use axum::routing::{get, patch, post};
use axum::{middleware, Json, Router};
use serde_json::json;
use tower_http::services::ServeDir;
use tracing::info;

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "commit": env!("GIT_HASH"),
    }))
}

async fn get_metrics() -> String {
    metrics::render_metrics()
}

pub fn make_app(state: AppState) -> Router {
    let auth_routes: Router<AppState> = Router::new()
        .route("/login", post(auth_routes::login))
        .route("/logout", post(auth_routes::logout))
        .route("/me", get(auth_routes::me));

    let library_routes: Router<AppState> = Router::new()
        .route(
            "/favorites",
            get(library_routes::list_favorites)
                .post(library_routes::add_favorite)
                .delete(library_routes::remove_favorite),
        )
        .route("/playlist", get(library_routes::list_playlist))
        .route(
            "/playlist/items",
            post(library_routes::add_playlist_item).delete(library_routes::remove_playlist_item),
        )
        .route(
            "/playlist/items/reorder",
            patch(library_routes::reorder_playlist),
        );

    let playback_routes: Router<AppState> = Router::new()
        .route("/log", post(playback_routes::post_playback_log))
        .route("/stats", get(playback_routes::get_playback_stats));

    let admin_routes: Router<AppState> = Router::new()
        .route("/users", post(auth_routes::admin_create_user))
        .route(
            "/playback/claim",
            post(auth_routes::admin_claim_playback_logs),
        );

    let mut app: Router<AppState> = Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/library", library_routes)
        .nest("/api/playback", playback_routes)
        .nest("/api/admin", admin_routes)
        .route("/api/audio", get(stream_audio::stream_audio))
        .route("/api/lyrics", get(stream_audio::get_lyrics))
        .route("/api/health", get(health))
        .route("/metrics", get(get_metrics));

    if let Some(frontend_dir) = &state.config.frontend_dir_path {
        app = app.fallback_service(ServeDir::new(frontend_dir));
    }

    app.layer(middleware::from_fn_with_state(
        state.clone(),
        requests_logging::log_requests,
    ))
    .with_state(state)
}

pub async fn run_server(state: AppState) -> Result<()> {
    let port = state.config.port;
    let app = make_app(state);
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("Ready to serve at port {}!", port);
    Ok(axum::serve(listener, app).await?)
}
