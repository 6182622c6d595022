//! Tests for the dual-backend discipline: an unreachable mirror must never
//! change the caller-visible outcome of a mutation.

use lizhi_player_server::library::{
    LibraryService, LibraryStore, NewFavorite, RemoteLibraryStore, SqliteLibraryStore, UserRole,
};
use lizhi_player_server::sqlite_persistence::{EmbeddedDb, VERSIONED_SCHEMAS};
use lizhi_player_server::supabase::{SupabaseClient, SupabaseConfig};
use lizhi_player_server::sync::{spawn_mirror_worker, SyncPolicy};
use lizhi_player_server::telemetry::{
    NewPlaybackLog, PlaybackEvent, RemoteTelemetryStore, SqliteTelemetryStore, StatsScope,
    TelemetryService, TelemetryStore,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A remote client pointing at a port nothing listens on.
fn unreachable_remote() -> Arc<SupabaseClient> {
    Arc::new(SupabaseClient::new(SupabaseConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        service_role_key: "test-service-key".to_string(),
        schema: "public".to_string(),
        enabled: true,
        primary: false,
    }))
}

struct Harness {
    library: LibraryService,
    telemetry: TelemetryService,
    _db_dir: TempDir,
}

/// Local primary, mirroring enabled, remote store down.
fn harness_with_dead_mirror() -> Harness {
    let db_dir = TempDir::new().unwrap();
    let db = Arc::new(
        EmbeddedDb::open(vec![db_dir.path().join("player.sqlite")], VERSIONED_SCHEMAS).unwrap(),
    );
    let local_library = Arc::new(SqliteLibraryStore::new(db.clone()));
    let local_telemetry = Arc::new(SqliteTelemetryStore::new(db));

    let client = unreachable_remote();
    let remote_library = Arc::new(RemoteLibraryStore::new(client.clone()));
    let remote_telemetry = Arc::new(RemoteTelemetryStore::new(client));

    let policy = SyncPolicy {
        enabled: true,
        remote_primary: false,
    };
    let mirror = spawn_mirror_worker(
        remote_library.clone() as Arc<dyn LibraryStore>,
        remote_telemetry.clone() as Arc<dyn TelemetryStore>,
    );

    let library = LibraryService::new(
        local_library,
        Some(remote_library),
        policy,
        Some(mirror.clone()),
        14 * 24 * 60 * 60,
    )
    .unwrap();
    let telemetry = TelemetryService::new(
        local_telemetry,
        Some(remote_telemetry),
        policy,
        Some(mirror),
    )
    .unwrap();

    Harness {
        library,
        telemetry,
        _db_dir: db_dir,
    }
}

#[tokio::test]
async fn mirrored_write_failure_is_invisible_to_the_caller() {
    let harness = harness_with_dead_mirror();

    let user = harness
        .library
        .create_user("someone@example.com", "a-password", UserRole::User)
        .await
        .unwrap();

    harness
        .library
        .add_favorite(NewFavorite {
            user_id: user.id,
            song_id: "song-1".to_string(),
            song_title: "Song".to_string(),
            album_name: "Album".to_string(),
        })
        .await
        .unwrap();

    // give the mirror worker time to attempt (and fail) the replication
    tokio::time::sleep(Duration::from_millis(200)).await;

    let favorites = harness.library.list_favorites(user.id).await.unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].song_id, "song-1");
}

#[tokio::test]
async fn playlist_mutations_survive_a_dead_mirror() {
    let harness = harness_with_dead_mirror();
    let user = harness
        .library
        .create_user("curator@example.com", "a-password", UserRole::User)
        .await
        .unwrap();

    for song in ["a", "b", "c"] {
        let added = harness
            .library
            .add_playlist_item(lizhi_player_server::library::NewPlaylistItem {
                user_id: user.id,
                playlist_id: "later".to_string(),
                song_id: song.to_string(),
                song_title: format!("Title {}", song),
                album_name: "Album".to_string(),
            })
            .await
            .unwrap();
        assert!(added);
    }

    harness
        .library
        .remove_playlist_item(user.id, "later", "b")
        .await
        .unwrap();

    let items = harness.library.list_playlist(user.id, "later").await.unwrap();
    let positions: Vec<i64> = items.iter().map(|item| item.position).collect();
    assert_eq!(positions, vec![0, 1]);
}

#[tokio::test]
async fn playback_logging_survives_a_dead_mirror() {
    let harness = harness_with_dead_mirror();

    harness
        .telemetry
        .insert_playback_log(NewPlaybackLog {
            session_id: "span-1".to_string(),
            song_id: "song-1".to_string(),
            song_title: "Song".to_string(),
            album_name: "Album".to_string(),
            event: PlaybackEvent::Ended,
            position_seconds: 60.0,
            played_seconds: 60.0,
            duration_seconds: Some(180.0),
            pathname: String::new(),
            user_agent: String::new(),
            user_id: Some(1),
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = harness
        .telemetry
        .playback_stats(StatsScope::Everyone)
        .await
        .unwrap();
    assert_eq!(stats.summary.sessions, 1);
    assert_eq!(stats.summary.play_count, 1);
}
