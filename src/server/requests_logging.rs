use super::metrics::HTTP_REQUESTS_TOTAL;
use super::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use clap::ValueEnum;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    #[default]
    Path,
    Headers,
}

pub async fn log_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if state.config.logging_level == RequestsLoggingLevel::Headers {
        debug!("{} {} headers: {:?}", method, path, request.headers());
    }

    let response = next.run(request).await;
    let status = response.status();

    if state.config.logging_level != RequestsLoggingLevel::None {
        info!("{} {} -> {}", method, path, status.as_u16());
    }
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), &path, status.as_str()])
        .inc();

    response
}
