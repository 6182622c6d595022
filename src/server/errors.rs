use crate::library::DomainError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Uniform JSON error body. Validation and authorization problems map to
/// 4xx; only genuine backend failures become 5xx.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> ApiError {
        ApiError {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> ApiError {
        ApiError::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> ApiError {
        match err {
            DomainError::DuplicateAccount => ApiError::new(StatusCode::CONFLICT, err.to_string()),
            DomainError::InvalidInput(message) => ApiError::new(StatusCode::BAD_REQUEST, message),
            DomainError::Backend(inner) => {
                error!("Backend failure: {:#}", inner);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Backend unavailable")
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> ApiError {
        error!("Internal error: {:#}", err);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
