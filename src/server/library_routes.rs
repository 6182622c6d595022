use super::errors::ApiError;
use super::session::Session;
use super::state::AppState;
use crate::library::models::normalize_playlist_id;
use crate::library::{NewFavorite, NewPlaylistItem};
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

fn read_trimmed(value: Option<String>, max_len: usize) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_len).collect())
}

pub async fn list_favorites(
    session: Session,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let items = state.library.list_favorites(session.user.id).await?;
    Ok(Json(json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteBody {
    song_id: Option<String>,
    song_title: Option<String>,
    album_name: Option<String>,
}

pub async fn add_favorite(
    session: Session,
    State(state): State<AppState>,
    Json(body): Json<FavoriteBody>,
) -> Result<Json<Value>, ApiError> {
    let song_id = read_trimmed(body.song_id, 300);
    let song_title = read_trimmed(body.song_title, 300);
    let album_name = read_trimmed(body.album_name, 300);
    let (Some(song_id), Some(song_title), Some(album_name)) = (song_id, song_title, album_name)
    else {
        return Err(ApiError::bad_request("Invalid favorite payload"));
    };

    state
        .library
        .add_favorite(NewFavorite {
            user_id: session.user.id,
            song_id,
            song_title,
            album_name,
        })
        .await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFavoriteBody {
    song_id: Option<String>,
}

pub async fn remove_favorite(
    session: Session,
    State(state): State<AppState>,
    Json(body): Json<RemoveFavoriteBody>,
) -> Result<Json<Value>, ApiError> {
    let Some(song_id) = read_trimmed(body.song_id, 300) else {
        return Err(ApiError::bad_request("songId is required"));
    };
    state.library.remove_favorite(session.user.id, &song_id).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistQuery {
    playlist_id: Option<String>,
}

pub async fn list_playlist(
    session: Session,
    State(state): State<AppState>,
    Query(query): Query<PlaylistQuery>,
) -> Result<Json<Value>, ApiError> {
    let playlist_id = normalize_playlist_id(query.playlist_id.as_deref());
    let items = state.library.list_playlist(session.user.id, &playlist_id).await?;
    Ok(Json(json!({ "playlistId": playlist_id, "items": items })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemBody {
    playlist_id: Option<String>,
    song_id: Option<String>,
    song_title: Option<String>,
    album_name: Option<String>,
}

pub async fn add_playlist_item(
    session: Session,
    State(state): State<AppState>,
    Json(body): Json<PlaylistItemBody>,
) -> Result<Json<Value>, ApiError> {
    let playlist_id = normalize_playlist_id(body.playlist_id.as_deref());
    let song_id = read_trimmed(body.song_id, 300);
    let song_title = read_trimmed(body.song_title, 300);
    let album_name = read_trimmed(body.album_name, 300);
    let (Some(song_id), Some(song_title), Some(album_name)) = (song_id, song_title, album_name)
    else {
        return Err(ApiError::bad_request("Invalid playlist payload"));
    };

    let added = state
        .library
        .add_playlist_item(NewPlaylistItem {
            user_id: session.user.id,
            playlist_id,
            song_id,
            song_title,
            album_name,
        })
        .await?;
    Ok(Json(json!({ "ok": true, "added": added })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovePlaylistItemBody {
    playlist_id: Option<String>,
    song_id: Option<String>,
}

pub async fn remove_playlist_item(
    session: Session,
    State(state): State<AppState>,
    Json(body): Json<RemovePlaylistItemBody>,
) -> Result<Json<Value>, ApiError> {
    let playlist_id = normalize_playlist_id(body.playlist_id.as_deref());
    let Some(song_id) = read_trimmed(body.song_id, 300) else {
        return Err(ApiError::bad_request("songId is required"));
    };
    state
        .library
        .remove_playlist_item(session.user.id, &playlist_id, &song_id)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderBody {
    playlist_id: Option<String>,
    song_ids: Option<Vec<String>>,
}

pub async fn reorder_playlist(
    session: Session,
    State(state): State<AppState>,
    Json(body): Json<ReorderBody>,
) -> Result<Json<Value>, ApiError> {
    let playlist_id = normalize_playlist_id(body.playlist_id.as_deref());
    let Some(raw_ids) = body.song_ids.filter(|ids| !ids.is_empty()) else {
        return Err(ApiError::bad_request("songIds is required"));
    };
    let song_ids: Vec<String> = raw_ids
        .iter()
        .filter_map(|id| read_trimmed(Some(id.clone()), 300))
        .collect();
    if song_ids.len() != raw_ids.len() {
        return Err(ApiError::bad_request("songIds contains invalid values"));
    }

    let applied = state
        .library
        .reorder_playlist(session.user.id, &playlist_id, &song_ids)
        .await?;
    if !applied {
        return Err(ApiError::bad_request(
            "songIds does not match playlist items",
        ));
    }
    Ok(Json(json!({ "ok": true })))
}
