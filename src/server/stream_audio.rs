//! Audio byte serving and lyric file serving.
//!
//! Local mode streams file bytes honoring HTTP Range requests (bounded,
//! open-ended and suffix forms). Cloud mode redirects audio to the object
//! store and proxies lyric text through the bounded-retry fetch.

use super::media::{build_cloud_asset_url, fetch_text_with_retry, resolve_media_file};
use super::state::AppState;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

const SUPPORTED_AUDIO_EXTENSIONS: &[(&str, &str)] =
    &[(".flac", "audio/flac"), (".m4a", "audio/mp4")];
const STREAM_BUFFER_SIZE: usize = 4096 * 16;

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    album: Option<String>,
    song: Option<String>,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    Bytes { start: u64, end: u64 },
    Unsatisfiable,
}

/// Resolves a `Range: bytes=start-end` header against the resource size.
/// Malformed headers and ranges entirely beyond the resource are both
/// unsatisfiable (416); a too-large end is clamped.
pub fn resolve_range(header_value: &str, file_size: u64) -> RangeOutcome {
    let Some(spec) = header_value.strip_prefix("bytes=") else {
        return RangeOutcome::Unsatisfiable;
    };
    let Some((start_raw, end_raw)) = spec.split_once('-') else {
        return RangeOutcome::Unsatisfiable;
    };
    if !start_raw.chars().all(|c| c.is_ascii_digit())
        || !end_raw.chars().all(|c| c.is_ascii_digit())
    {
        return RangeOutcome::Unsatisfiable;
    }
    if start_raw.is_empty() && end_raw.is_empty() {
        return RangeOutcome::Unsatisfiable;
    }
    if file_size == 0 {
        return RangeOutcome::Unsatisfiable;
    }

    if start_raw.is_empty() {
        // suffix form: the last N bytes
        let Ok(suffix_len) = end_raw.parse::<u64>() else {
            return RangeOutcome::Unsatisfiable;
        };
        if suffix_len == 0 {
            return RangeOutcome::Unsatisfiable;
        }
        return RangeOutcome::Bytes {
            start: file_size.saturating_sub(suffix_len),
            end: file_size - 1,
        };
    }

    let Ok(start) = start_raw.parse::<u64>() else {
        return RangeOutcome::Unsatisfiable;
    };
    let end = if end_raw.is_empty() {
        file_size - 1
    } else {
        match end_raw.parse::<u64>() {
            Ok(end) => end,
            Err(_) => return RangeOutcome::Unsatisfiable,
        }
    };
    if start >= file_size || end < start {
        return RangeOutcome::Unsatisfiable;
    }
    RangeOutcome::Bytes {
        start,
        end: end.min(file_size - 1),
    }
}

async fn resolve_audio_file(
    state: &AppState,
    album: &str,
    song: &str,
) -> Result<Option<(PathBuf, u64, &'static str)>, Response> {
    for (extension, content_type) in SUPPORTED_AUDIO_EXTENSIONS {
        let file_name = format!("{}{}", song, extension);
        let Some(path) = resolve_media_file(&state.config.media_path, album, &file_name) else {
            return Err(json_error(StatusCode::BAD_REQUEST, "Invalid album or song"));
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => return Ok(Some((path, meta.len(), content_type))),
            _ => continue,
        }
    }
    Ok(None)
}

fn cloud_audio_file_name(song: &str) -> String {
    let already_audio = SUPPORTED_AUDIO_EXTENSIONS
        .iter()
        .any(|(extension, _)| song.ends_with(extension));
    if already_audio {
        song.to_string()
    } else {
        format!("{}.flac", song)
    }
}

pub async fn stream_audio(
    State(state): State<AppState>,
    Query(query): Query<MediaQuery>,
    headers: HeaderMap,
) -> Response {
    let (Some(album), Some(song)) = (query.album, query.song) else {
        return json_error(StatusCode::BAD_REQUEST, "Missing album or song");
    };

    if state.config.assets.is_cloud() {
        let file_name = cloud_audio_file_name(&song);
        return match build_cloud_asset_url(&state.config.assets, &album, &file_name) {
            Some(url) => Redirect::temporary(&url).into_response(),
            None => {
                error!("ASSET_BASE_URL is missing for cloud audio mode");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Cloud audio unavailable")
            }
        };
    }

    let resolved = match resolve_audio_file(&state, &album, &song).await {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };
    let Some((path, file_size, content_type)) = resolved else {
        return json_error(StatusCode::NOT_FOUND, "Audio not found");
    };
    debug!("Streaming {} ({} bytes)", path.display(), file_size);

    let range_header = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    let Some(range_header) = range_header else {
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        };
        let reader = BufReader::with_capacity(STREAM_BUFFER_SIZE, file);
        let stream = ReaderStream::with_capacity(reader, STREAM_BUFFER_SIZE);
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, file_size)
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::from_stream(stream))
            .unwrap();
    };

    match resolve_range(range_header, file_size) {
        RangeOutcome::Unsatisfiable => Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{}", file_size))
            .body(Body::empty())
            .unwrap(),
        RangeOutcome::Bytes { start, end } => {
            let mut file = match File::open(&path).await {
                Ok(file) => file,
                Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            };
            if file.seek(SeekFrom::Start(start)).await.is_err() {
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            let chunk_size = end - start + 1;
            let reader = BufReader::with_capacity(STREAM_BUFFER_SIZE, file.take(chunk_size));
            let stream = ReaderStream::with_capacity(reader, STREAM_BUFFER_SIZE);
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, chunk_size)
                .header(header::ACCEPT_RANGES, "bytes")
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, file_size),
                )
                .body(Body::from_stream(stream))
                .unwrap()
        }
    }
}

pub async fn get_lyrics(
    State(state): State<AppState>,
    Query(query): Query<MediaQuery>,
) -> Response {
    let (Some(album), Some(song)) = (query.album, query.song) else {
        return json_error(StatusCode::BAD_REQUEST, "Missing album or song");
    };
    let file_name = format!("{}.lrc", song);

    if state.config.assets.is_cloud() {
        let Some(url) = build_cloud_asset_url(&state.config.assets, &album, &file_name) else {
            error!("ASSET_BASE_URL is missing for cloud lyrics mode");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Cloud lyrics unavailable");
        };
        return match fetch_text_with_retry(&state.assets_http, &url).await {
            Ok(Some(content)) => Json(json!({ "lyrics": content })).into_response(),
            Ok(None) => json_error(StatusCode::NOT_FOUND, "Lyrics not found"),
            Err(err) => {
                error!("Cloud lyrics fetch error: {:#}", err);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "Cloud lyrics unavailable")
            }
        };
    }

    let Some(path) = resolve_media_file(&state.config.media_path, &album, &file_name) else {
        return json_error(StatusCode::BAD_REQUEST, "Invalid album or song");
    };
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Json(json!({ "lyrics": content })).into_response(),
        Err(_) => json_error(StatusCode::NOT_FOUND, "Lyrics not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(start: u64, end: u64) -> RangeOutcome {
        RangeOutcome::Bytes { start, end }
    }

    #[test]
    fn bounded_range_on_1000_byte_resource() {
        assert_eq!(resolve_range("bytes=100-199", 1000), bytes(100, 199));
    }

    #[test]
    fn suffix_range_returns_last_bytes() {
        assert_eq!(resolve_range("bytes=-50", 1000), bytes(950, 999));
        // suffix longer than the file starts at zero
        assert_eq!(resolve_range("bytes=-5000", 1000), bytes(0, 999));
    }

    #[test]
    fn open_ended_range_runs_to_the_end() {
        assert_eq!(resolve_range("bytes=900-", 1000), bytes(900, 999));
    }

    #[test]
    fn end_is_clamped_to_file_size() {
        assert_eq!(resolve_range("bytes=900-99999", 1000), bytes(900, 999));
    }

    #[test]
    fn range_beyond_resource_is_unsatisfiable() {
        assert_eq!(resolve_range("bytes=1000-1100", 1000), RangeOutcome::Unsatisfiable);
        assert_eq!(resolve_range("bytes=2000-", 1000), RangeOutcome::Unsatisfiable);
    }

    #[test]
    fn malformed_ranges_are_unsatisfiable() {
        for malformed in [
            "bytes=",
            "bytes=-",
            "bytes=abc-def",
            "bytes=10-5-2",
            "bytes=-0",
            "items=0-10",
            "bytes=5-2",
        ] {
            assert_eq!(
                resolve_range(malformed, 1000),
                RangeOutcome::Unsatisfiable,
                "{}",
                malformed
            );
        }
    }

    #[test]
    fn empty_file_has_no_satisfiable_range() {
        assert_eq!(resolve_range("bytes=0-10", 0), RangeOutcome::Unsatisfiable);
        assert_eq!(resolve_range("bytes=-10", 0), RangeOutcome::Unsatisfiable);
    }

    #[test]
    fn cloud_file_name_keeps_known_extensions() {
        assert_eq!(cloud_audio_file_name("song.m4a"), "song.m4a");
        assert_eq!(cloud_audio_file_name("song"), "song.flac");
    }
}
