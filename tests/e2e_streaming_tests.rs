//! End-to-end tests for the media range server and lyric serving.

mod common;

use common::{TestClient, TestServer};
use reqwest::StatusCode;
use serde_json::Value;

const ALBUM: &str = "Test Album";
const SONG: &str = "first-song";

async fn server_with_song(bytes: &[u8]) -> TestServer {
    let server = TestServer::spawn().await;
    let album_dir = server.media_dir.path().join(ALBUM);
    std::fs::create_dir_all(&album_dir).unwrap();
    std::fs::write(album_dir.join(format!("{}.flac", SONG)), bytes).unwrap();
    server
}

fn audio_url(album: &str, song: &str) -> String {
    format!("/api/audio?album={}&song={}", urlencoding::encode(album), urlencoding::encode(song))
}

fn test_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn full_request_returns_entire_file() {
    let content = test_bytes(1000);
    let server = server_with_song(&content).await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get(&audio_url(ALBUM, SONG)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("accept-ranges").unwrap(),
        "bytes"
    );
    assert_eq!(
        response.headers().get("content-length").unwrap(),
        "1000"
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), &content[..]);
}

#[tokio::test]
async fn bounded_range_returns_exactly_those_bytes() {
    let content = test_bytes(1000);
    let server = server_with_song(&content).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}{}", server.base_url, audio_url(ALBUM, SONG)))
        .header("Range", "bytes=100-199")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers().get("content-range").unwrap(),
        "bytes 100-199/1000"
    );
    assert_eq!(response.headers().get("content-length").unwrap(), "100");
    assert_eq!(response.bytes().await.unwrap().as_ref(), &content[100..200]);
}

#[tokio::test]
async fn suffix_range_returns_last_bytes() {
    let content = test_bytes(1000);
    let server = server_with_song(&content).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}{}", server.base_url, audio_url(ALBUM, SONG)))
        .header("Range", "bytes=-50")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers().get("content-range").unwrap(),
        "bytes 950-999/1000"
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), &content[950..]);
}

#[tokio::test]
async fn open_ended_range_runs_to_the_end() {
    let content = test_bytes(1000);
    let server = server_with_song(&content).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}{}", server.base_url, audio_url(ALBUM, SONG)))
        .header("Range", "bytes=990-")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers().get("content-range").unwrap(),
        "bytes 990-999/1000"
    );
    assert_eq!(response.bytes().await.unwrap().len(), 10);
}

#[tokio::test]
async fn range_beyond_file_is_unsatisfiable() {
    let server = server_with_song(&test_bytes(1000)).await;
    let client = reqwest::Client::new();

    for range in ["bytes=1000-1100", "bytes=2000-", "bytes=abc-def", "bytes=-"] {
        let response = client
            .get(format!("{}{}", server.base_url, audio_url(ALBUM, SONG)))
            .header("Range", range)
            .send()
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::RANGE_NOT_SATISFIABLE,
            "{}",
            range
        );
        assert_eq!(
            response.headers().get("content-range").unwrap(),
            "bytes */1000"
        );
    }
}

#[tokio::test]
async fn traversal_attempts_are_rejected() {
    let server = server_with_song(&test_bytes(100)).await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get(&audio_url("..", SONG)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .get("/api/audio?album=Test%20Album&song=..%2F..%2Fetc%2Fpasswd")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_song_is_not_found() {
    let server = server_with_song(&test_bytes(100)).await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get(&audio_url(ALBUM, "no-such-song")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client.get("/api/audio?album=Test%20Album").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lyrics_are_served_from_local_files() {
    let server = server_with_song(&test_bytes(100)).await;
    let lyrics = "[00:01.00] First line\n[00:05.00] Second line\n";
    std::fs::write(
        server
            .media_dir
            .path()
            .join(ALBUM)
            .join(format!("{}.lrc", SONG)),
        lyrics,
    )
    .unwrap();

    let client = TestClient::new(server.base_url.clone());
    let response = client
        .get(&format!(
            "/api/lyrics?album={}&song={}",
            urlencoding::encode(ALBUM),
            urlencoding::encode(SONG)
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["lyrics"], lyrics);

    let response = client
        .get(&format!(
            "/api/lyrics?album={}&song=missing",
            urlencoding::encode(ALBUM)
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
