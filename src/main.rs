use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lizhi_player_server::config::{AppConfig, CliConfig, FileConfig};
use lizhi_player_server::library::{
    LibraryService, LibraryStore, RemoteLibraryStore, SqliteLibraryStore,
};
use lizhi_player_server::server::{self, AppState, RequestsLoggingLevel};
use lizhi_player_server::sqlite_persistence::{EmbeddedDb, VERSIONED_SCHEMAS};
use lizhi_player_server::supabase::{SupabaseClient, SupabaseConfig};
use lizhi_player_server::sync::{spawn_mirror_worker, SyncPolicy};
use lizhi_player_server::telemetry::{
    RemoteTelemetryStore, SqliteTelemetryStore, TelemetryService, TelemetryStore,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let resolved = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(err) => {
            if err.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(err).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if resolved.is_absolute() {
        return Ok(resolved);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(resolved))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite database file. Without it the standard chain is
    /// used: env override, ./data, home directory, temp directory.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Path to the album media directory (audio and lyric files).
    #[clap(long, value_parser = parse_path)]
    pub media_path: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Auth session lifetime in days.
    #[clap(long)]
    pub session_days: Option<u32>,

    /// Mark the auth cookie Secure (use behind TLS).
    #[clap(long)]
    pub secure_cookies: bool,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Optional TOML config file; its values override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    info!(
        "Starting lizhi-player-server {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let file_config = cli_args
        .config
        .as_ref()
        .map(|path| FileConfig::load(path))
        .transpose()?;
    let cli_config = CliConfig {
        db_path: cli_args.db_path,
        media_path: cli_args.media_path,
        port: cli_args.port,
        logging_level: cli_args.logging_level,
        session_days: cli_args.session_days,
        secure_cookies: cli_args.secure_cookies,
        frontend_dir_path: cli_args.frontend_dir_path,
    };
    let config = Arc::new(AppConfig::resolve(&cli_config, file_config)?);

    server::metrics::init_metrics();

    let db = Arc::new(EmbeddedDb::open(
        config.db_candidates.clone(),
        VERSIONED_SCHEMAS,
    )?);
    let local_library = Arc::new(SqliteLibraryStore::new(db.clone()));
    let local_telemetry = Arc::new(SqliteTelemetryStore::new(db.clone()));

    let supabase_config = SupabaseConfig::from_env();
    let policy = SyncPolicy::from_config(&supabase_config);

    let (remote_library, remote_telemetry) = if policy.enabled {
        info!(
            "Remote store sync enabled, {} is primary",
            if policy.remote_primary { "remote" } else { "local" }
        );
        let client = Arc::new(SupabaseClient::new(supabase_config));
        (
            Some(Arc::new(RemoteLibraryStore::new(client.clone()))),
            Some(Arc::new(RemoteTelemetryStore::new(client))),
        )
    } else {
        info!("Remote store sync disabled, running on the embedded store only");
        (None, None)
    };

    // the mirror worker replays committed mutations against whichever side
    // is not authoritative
    let mirror = if policy.enabled {
        let (library_target, telemetry_target): (Arc<dyn LibraryStore>, Arc<dyn TelemetryStore>) =
            if policy.remote_primary {
                (local_library.clone(), local_telemetry.clone())
            } else {
                (
                    remote_library.clone().expect("remote store is configured"),
                    remote_telemetry.clone().expect("remote store is configured"),
                )
            };
        Some(spawn_mirror_worker(library_target, telemetry_target))
    } else {
        None
    };

    let library = Arc::new(LibraryService::new(
        local_library,
        remote_library,
        policy,
        mirror.clone(),
        config.session_max_age_seconds,
    )?);
    let telemetry = Arc::new(TelemetryService::new(
        local_telemetry,
        remote_telemetry,
        policy,
        mirror,
    )?);

    let state = AppState::new(config, library, telemetry, db);
    server::run_server(state).await
}
