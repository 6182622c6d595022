use super::errors::ApiError;
use super::session::Session;
use super::state::AppState;
use crate::library::models::now_iso;
use crate::telemetry::{NewPlaybackLog, PlaybackEvent, StatsScope};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

fn read_trimmed(value: Option<String>, max_len: usize) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_len).collect())
}

fn clamped(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0).max(0.0)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackLogBody {
    session_id: Option<String>,
    song_id: Option<String>,
    song_title: Option<String>,
    album_name: Option<String>,
    event: Option<String>,
    position_seconds: Option<f64>,
    played_seconds: Option<f64>,
    duration_seconds: Option<f64>,
    pathname: Option<String>,
}

/// The insert is spawned fire-and-forget: a failing write path never changes
/// the caller's perceived outcome.
pub async fn post_playback_log(
    session: Option<Session>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PlaybackLogBody>,
) -> Response {
    let Some(session) = session else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let session_id = read_trimmed(body.session_id, 120);
    let song_id = read_trimmed(body.song_id, 200);
    let song_title = read_trimmed(body.song_title, 300);
    let album_name = read_trimmed(body.album_name, 300);
    let event = read_trimmed(body.event, 40).and_then(|e| PlaybackEvent::parse(&e));

    let (Some(session_id), Some(song_id), Some(song_title), Some(album_name), Some(event)) =
        (session_id, song_id, song_title, album_name, event)
    else {
        return ApiError::bad_request("Invalid playback log payload").into_response();
    };

    let entry = NewPlaybackLog {
        session_id,
        song_id,
        song_title,
        album_name,
        event,
        position_seconds: clamped(body.position_seconds),
        played_seconds: clamped(body.played_seconds),
        duration_seconds: body
            .duration_seconds
            .filter(|v| v.is_finite())
            .map(|v| v.max(0.0)),
        pathname: read_trimmed(body.pathname, 500).unwrap_or_default(),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        user_id: Some(session.user.id),
    };

    let telemetry = state.telemetry.clone();
    tokio::spawn(async move {
        if let Err(err) = telemetry.insert_playback_log(entry).await {
            error!("Failed to persist playback log: {:#}", err);
        }
    });

    Json(json!({ "ok": true })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    scope: Option<String>,
}

pub async fn get_playback_stats(
    session: Option<Session>,
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, ApiError> {
    let scope = match &session {
        Some(s) if s.user.role.is_admin() && query.scope.as_deref() == Some("all") => {
            StatsScope::Registered
        }
        Some(s) => StatsScope::User(s.user.id),
        None => StatsScope::Registered,
    };

    let stats = state.telemetry.playback_stats(scope).await?;
    let mut payload = serde_json::to_value(&stats).map_err(anyhow::Error::from)?;
    if let Some(object) = payload.as_object_mut() {
        object.insert(
            "user".to_string(),
            match &session {
                Some(s) => json!({
                    "id": s.user.id,
                    "email": s.user.email,
                    "role": s.user.role,
                }),
                None => Value::Null,
            },
        );
        object.insert(
            "dbPath".to_string(),
            json!(state.db.path().display().to_string()),
        );
        object.insert("generatedAt".to_string(), json!(now_iso()));
    }
    Ok(Json(payload))
}
