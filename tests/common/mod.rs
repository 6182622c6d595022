//! Common test infrastructure
//!
//! Spawns the real app on an ephemeral port against a temporary database,
//! with the remote store disabled. Tests should only import from this module.

use lizhi_player_server::config::{AppConfig, CliConfig};
use lizhi_player_server::library::{LibraryService, SqliteLibraryStore, UserRole};
use lizhi_player_server::server::{make_app, AppState};
use lizhi_player_server::sqlite_persistence::{EmbeddedDb, VERSIONED_SCHEMAS};
use lizhi_player_server::sync::SyncPolicy;
use lizhi_player_server::telemetry::{SqliteTelemetryStore, TelemetryService};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

pub const TEST_USER: &str = "listener@example.com";
pub const TEST_PASSWORD: &str = "listen-all-day";
pub const TEST_ADMIN: &str = "admin@example.com";
pub const TEST_ADMIN_PASSWORD: &str = "admin-password";

pub struct TestServer {
    pub base_url: String,
    pub state: AppState,
    /// Direct store handle for fixtures the HTTP surface cannot produce
    /// (e.g. already-expired sessions).
    pub library_store: Arc<SqliteLibraryStore>,
    pub media_dir: TempDir,
    _db_dir: TempDir,
}

impl TestServer {
    pub async fn spawn() -> TestServer {
        let db_dir = TempDir::new().unwrap();
        let media_dir = TempDir::new().unwrap();

        let cli = CliConfig {
            db_path: Some(db_dir.path().join("player.sqlite")),
            media_path: Some(media_dir.path().to_path_buf()),
            ..Default::default()
        };
        let config = Arc::new(AppConfig::resolve(&cli, None).unwrap());

        let db = Arc::new(
            EmbeddedDb::open(config.db_candidates.clone(), VERSIONED_SCHEMAS).unwrap(),
        );
        let library_store = Arc::new(SqliteLibraryStore::new(db.clone()));
        let telemetry_store = Arc::new(SqliteTelemetryStore::new(db.clone()));
        let policy = SyncPolicy::local_only();

        let library = Arc::new(
            LibraryService::new(
                library_store.clone(),
                None,
                policy,
                None,
                config.session_max_age_seconds,
            )
            .unwrap(),
        );
        let telemetry = Arc::new(
            TelemetryService::new(telemetry_store, None, policy, None).unwrap(),
        );

        let state = AppState::new(config, library, telemetry, db);

        state
            .library
            .upsert_user(TEST_ADMIN, TEST_ADMIN_PASSWORD, UserRole::Admin)
            .await
            .unwrap();
        state
            .library
            .upsert_user(TEST_USER, TEST_PASSWORD, UserRole::User)
            .await
            .unwrap();

        let app = make_app(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            base_url: format!("http://{}", addr),
            state,
            library_store,
            media_dir,
            _db_dir: db_dir,
        }
    }
}

pub struct TestClient {
    http: reqwest::Client,
    base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> TestClient {
        TestClient {
            http: reqwest::Client::builder()
                .cookie_store(true)
                .build()
                .unwrap(),
            base_url,
        }
    }

    /// A client already logged in with the regular test user.
    pub async fn authenticated(base_url: String) -> TestClient {
        let client = TestClient::new(base_url);
        let response = client.login(TEST_USER, TEST_PASSWORD).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        client
    }

    /// A client already logged in with the admin test user.
    pub async fn admin(base_url: String) -> TestClient {
        let client = TestClient::new(base_url);
        let response = client.login(TEST_ADMIN, TEST_ADMIN_PASSWORD).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        client
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn login(&self, account: &str, password: &str) -> reqwest::Response {
        self.post(
            "/api/auth/login",
            &serde_json::json!({ "account": account, "password": password }),
        )
        .await
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.http.get(self.url(path)).send().await.unwrap()
    }

    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn patch(&self, path: &str, body: &Value) -> reqwest::Response {
        self.http
            .patch(self.url(path))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, path: &str, body: &Value) -> reqwest::Response {
        self.http
            .delete(self.url(path))
            .json(body)
            .send()
            .await
            .unwrap()
    }
}
