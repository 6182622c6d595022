use super::errors::ApiError;
use super::session::{Session, AUTH_COOKIE_NAME};
use super::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::{json, Value};

const MIN_PASSWORD_LEN: usize = 4;

fn read_trimmed(value: Option<String>, max_len: usize) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_len).collect())
}

fn user_view(user: &crate::library::User) -> Value {
    json!({
        "id": user.id,
        "email": user.email,
        "role": user.role,
    })
}

fn build_auth_cookie(state: &AppState, token: String, max_age_seconds: i64) -> Cookie<'static> {
    let mut cookie = Cookie::new(AUTH_COOKIE_NAME, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(state.config.secure_cookies);
    cookie.set_max_age(time::Duration::seconds(max_age_seconds));
    cookie
}

fn clear_auth_cookie(state: &AppState) -> Cookie<'static> {
    let mut cookie = Cookie::new(AUTH_COOKIE_NAME, "");
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(state.config.secure_cookies);
    cookie.set_max_age(time::Duration::ZERO);
    cookie.set_expires(time::OffsetDateTime::UNIX_EPOCH);
    cookie
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    account: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    let account = read_trimmed(body.account, 320).or_else(|| read_trimmed(body.email, 320));
    let password = read_trimmed(body.password, 200);
    let (Some(account), Some(password)) = (account, password) else {
        return Err(ApiError::bad_request("Account and password are required"));
    };

    let Some(user) = state.library.verify_login(&account, &password).await? else {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "Invalid account or password",
        ));
    };

    let session = state.library.create_persisted_session(user.id).await?;
    let cookie = build_auth_cookie(&state, session.token, session.max_age_seconds);
    Ok((jar.add(cookie), Json(json!({ "user": user_view(&user) }))))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(cookie) = jar.get(AUTH_COOKIE_NAME) {
        state.library.remove_session(cookie.value()).await?;
    }
    let jar = jar.add(clear_auth_cookie(&state));
    Ok((jar, Json(json!({ "ok": true }))))
}

pub async fn me(session: Option<Session>) -> Json<Value> {
    match session {
        Some(session) => Json(json!({ "user": user_view(&session.user) })),
        None => Json(json!({ "user": null })),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserBody {
    account: Option<String>,
    email: Option<String>,
    password: Option<String>,
    role: Option<String>,
}

pub async fn admin_create_user(
    session: Session,
    State(state): State<AppState>,
    Json(body): Json<CreateUserBody>,
) -> Result<Json<Value>, ApiError> {
    if !session.user.role.is_admin() {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "Forbidden"));
    }

    let account = read_trimmed(body.account, 320).or_else(|| read_trimmed(body.email, 320));
    let password = read_trimmed(body.password, 200);
    let (Some(account), Some(password)) = (account, password) else {
        return Err(ApiError::bad_request("Account and password are required"));
    };
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(
            "Password must be at least 4 characters",
        ));
    }
    let role = crate::library::UserRole::parse(
        read_trimmed(body.role, 20).as_deref().unwrap_or("user"),
    );

    let user = state.library.create_user(&account, &password, role).await?;
    Ok(Json(json!({
        "user": {
            "id": user.id,
            "email": user.email,
            "role": user.role,
            "isActive": user.is_active,
        }
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimLogsBody {
    user_id: Option<i64>,
}

/// Claims anonymous playback rows for a user (defaults to the caller).
pub async fn admin_claim_playback_logs(
    session: Session,
    State(state): State<AppState>,
    Json(body): Json<ClaimLogsBody>,
) -> Result<Json<Value>, ApiError> {
    if !session.user.role.is_admin() {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "Forbidden"));
    }
    let user_id = body.user_id.unwrap_or(session.user.id);
    let outcome = state.telemetry.migrate_anonymous_logs(user_id).await?;
    Ok(Json(json!(outcome)))
}
