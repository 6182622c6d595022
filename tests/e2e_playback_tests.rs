//! End-to-end tests for playback log ingestion and stats aggregation.

mod common;

use common::{TestClient, TestServer};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

fn log_body(session_id: &str, song_id: &str, event: &str, played_seconds: f64) -> Value {
    json!({
        "sessionId": session_id,
        "songId": song_id,
        "songTitle": format!("Title of {}", song_id),
        "albumName": "Test Album",
        "event": event,
        "positionSeconds": played_seconds,
        "playedSeconds": played_seconds,
        "durationSeconds": 180.0,
        "pathname": "/player/test-album",
    })
}

/// Log writes are fire-and-forget on the server, so stats are polled until
/// the expected session count lands.
async fn stats_with_sessions(client: &TestClient, path: &str, expected_sessions: u64) -> Value {
    for _ in 0..50 {
        let stats: Value = client.get(path).await.json().await.unwrap();
        if stats["summary"]["sessions"].as_u64() == Some(expected_sessions) {
            return stats;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("stats never reached {} sessions", expected_sessions);
}

#[tokio::test]
async fn long_span_counts_as_a_qualified_play() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let response = client
        .post("/api/playback/log", &log_body("span-1", "song-1", "play", 0.0))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = client
        .post("/api/playback/log", &log_body("span-1", "song-1", "pause", 42.0))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let stats = stats_with_sessions(&client, "/api/playback/stats", 1).await;
    assert_eq!(stats["summary"]["playCount"], 1);
    assert!(stats["summary"]["totalPlayedSeconds"].as_f64().unwrap() >= 42.0);
    assert_eq!(stats["summary"]["songCount"], 1);
    assert_eq!(stats["songs"][0]["songId"], "song-1");
    assert_eq!(stats["thresholdSeconds"], 30.0);
}

#[tokio::test]
async fn short_span_counts_as_session_but_not_play() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    client
        .post("/api/playback/log", &log_body("span-1", "song-1", "play", 0.0))
        .await;
    client
        .post(
            "/api/playback/log",
            &log_body("span-1", "song-1", "page_hide", 10.0),
        )
        .await;

    let stats = stats_with_sessions(&client, "/api/playback/stats", 1).await;
    assert_eq!(stats["summary"]["playCount"], 0);
}

#[tokio::test]
async fn anonymous_log_posts_are_dropped_silently() {
    let server = TestServer::spawn().await;
    let anonymous = TestClient::new(server.base_url.clone());

    let response = anonymous
        .post("/api/playback/log", &log_body("span-1", "song-1", "ended", 60.0))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // nothing was written
    let client = TestClient::authenticated(server.base_url.clone()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats: Value = client
        .get("/api/playback/stats")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stats["summary"]["sessions"], 0);
}

#[tokio::test]
async fn invalid_event_type_is_rejected() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let response = client
        .post(
            "/api/playback/log",
            &log_body("span-1", "song-1", "seeked", 5.0),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_scope_all_aggregates_registered_users() {
    let server = TestServer::spawn().await;
    let user_client = TestClient::authenticated(server.base_url.clone()).await;
    let admin_client = TestClient::admin(server.base_url.clone()).await;

    user_client
        .post("/api/playback/log", &log_body("s1", "song-1", "ended", 60.0))
        .await;
    admin_client
        .post("/api/playback/log", &log_body("s2", "song-2", "ended", 45.0))
        .await;

    // per-user scope sees only the caller's events
    let user_stats = stats_with_sessions(&user_client, "/api/playback/stats", 1).await;
    assert_eq!(user_stats["songs"][0]["songId"], "song-1");

    // admin with scope=all sees every registered user's events
    let all_stats = stats_with_sessions(&admin_client, "/api/playback/stats?scope=all", 2).await;
    assert_eq!(all_stats["summary"]["songCount"], 2);

    // a regular user asking for scope=all still only gets their own
    let own_stats = stats_with_sessions(&user_client, "/api/playback/stats?scope=all", 1).await;
    assert_eq!(own_stats["summary"]["songCount"], 1);
}

#[tokio::test]
async fn admin_claims_anonymous_rows() {
    let server = TestServer::spawn().await;
    let admin_client = TestClient::admin(server.base_url.clone()).await;

    // anonymous rows can only originate outside the HTTP surface
    use lizhi_player_server::telemetry::{NewPlaybackLog, PlaybackEvent};
    server
        .state
        .telemetry
        .insert_playback_log(NewPlaybackLog {
            session_id: "legacy".to_string(),
            song_id: "song-1".to_string(),
            song_title: "Title".to_string(),
            album_name: "Test Album".to_string(),
            event: PlaybackEvent::Ended,
            position_seconds: 60.0,
            played_seconds: 60.0,
            duration_seconds: None,
            pathname: String::new(),
            user_agent: String::new(),
            user_id: None,
        })
        .await
        .unwrap();

    let admin_user = server
        .state
        .library
        .get_user_by_account(common::TEST_ADMIN)
        .await
        .unwrap()
        .unwrap();

    let outcome: Value = admin_client
        .post(
            "/api/admin/playback/claim",
            &json!({ "userId": admin_user.id }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["migratedCount"], 1);
    assert_eq!(outcome["remainingNullCount"], 0);

    // claiming again moves nothing
    let again: Value = admin_client
        .post("/api/admin/playback/claim", &json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(again["migratedCount"], 0);
}
