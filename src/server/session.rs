use super::state::AppState;
use crate::library::User;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use tracing::debug;

pub const AUTH_COOKIE_NAME: &str = "lizhi_auth_session";
const AUTH_HEADER: &str = "Authorization";

/// An authenticated request: the resolved user plus the raw token it was
/// resolved from (needed again at logout).
#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub raw_token: String,
}

pub enum SessionRejection {
    Unauthorized,
    Internal,
}

impl IntoResponse for SessionRejection {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionRejection::Unauthorized => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response()
            }
            SessionRejection::Internal => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

async fn token_from_cookies(parts: &mut Parts, state: &AppState) -> Option<String> {
    CookieJar::from_request_parts(parts, state)
        .await
        .ok()?
        .get(AUTH_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
}

fn token_from_headers(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTH_HEADER)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

async fn resolve(parts: &mut Parts, state: &AppState) -> Result<Option<Session>, SessionRejection> {
    let token = match token_from_cookies(parts, state).await.or_else(|| token_from_headers(parts)) {
        Some(token) => token,
        None => return Ok(None),
    };

    match state.library.resolve_session(&token).await {
        Ok(Some(session_user)) => Ok(Some(Session {
            user: session_user.user,
            raw_token: token,
        })),
        Ok(None) => Ok(None),
        Err(err) => {
            debug!("Session resolution failed: {:#}", err);
            Err(SessionRejection::Internal)
        }
    }
}

impl FromRequestParts<AppState> for Session {
    type Rejection = SessionRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        resolve(parts, state)
            .await?
            .ok_or(SessionRejection::Unauthorized)
    }
}

impl FromRequestParts<AppState> for Option<Session> {
    type Rejection = SessionRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        resolve(parts, state).await
    }
}
