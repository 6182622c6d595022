mod file_config;

pub use file_config::FileConfig;

use crate::server::RequestsLoggingLevel;
use anyhow::Result;
use clap::ValueEnum;
use std::path::{Path, PathBuf};

pub const DB_FILE_NAME: &str = "playback_logs.sqlite";
const DEFAULT_SESSION_DAYS: u32 = 14;

/// CLI arguments that participate in config resolution. Mirrors the fields a
/// TOML config file can override.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub media_path: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub session_days: Option<u32>,
    pub secure_cookies: bool,
    pub frontend_dir_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Ordered open-path chain for the embedded database.
    pub db_candidates: Vec<PathBuf>,
    pub media_path: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub session_max_age_seconds: i64,
    pub secure_cookies: bool,
    pub frontend_dir_path: Option<String>,
    pub assets: AssetSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and an optional TOML file.
    /// TOML values override CLI values where present; remote-store and asset
    /// settings come from the environment.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<AppConfig> {
        let file = file_config.unwrap_or_default();

        let explicit_db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone());
        let db_candidates = db_candidate_paths(explicit_db_path.as_deref());

        let media_path = file
            .media_path
            .map(PathBuf::from)
            .or_else(|| cli.media_path.clone())
            .unwrap_or_else(|| {
                std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join("albums")
            });

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| RequestsLoggingLevel::from_str(&s, true).ok())
            .unwrap_or(cli.logging_level);

        let session_days = env_u32("AUTH_SESSION_DAYS")
            .or(file.session_days)
            .or(cli.session_days)
            .unwrap_or(DEFAULT_SESSION_DAYS)
            .max(1);

        let secure_cookies = file.secure_cookies.unwrap_or(cli.secure_cookies);
        let frontend_dir_path = file.frontend_dir_path.or_else(|| cli.frontend_dir_path.clone());

        Ok(AppConfig {
            db_candidates,
            media_path,
            port,
            logging_level,
            session_max_age_seconds: session_days as i64 * 24 * 60 * 60,
            secure_cookies,
            frontend_dir_path,
            assets: AssetSettings::from_env(),
        })
    }
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn env_nonempty(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Preferred path for the embedded database: explicit configuration first,
/// then the environment overrides, then `data/` under the working directory.
fn preferred_db_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(file) = env_nonempty("PLAYBACK_LOG_DB_PATH") {
        return PathBuf::from(file);
    }
    if let Some(dir) = env_nonempty("PLAYBACK_LOG_DIR") {
        return PathBuf::from(dir).join(DB_FILE_NAME);
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("data")
        .join(DB_FILE_NAME)
}

/// The full open chain: preferred path, per-user home fallback, temp-dir
/// last resort. Kept behind this function so callers never see the chain.
pub fn db_candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = vec![preferred_db_path(explicit)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".lizhi-player").join(DB_FILE_NAME));
    }
    candidates.push(std::env::temp_dir().join("lizhi-player").join(DB_FILE_NAME));
    candidates.dedup();
    candidates
}

/// The offline CLIs open exactly the preferred path, no fallback chain.
pub fn resolve_sync_db_path(explicit: Option<&Path>) -> PathBuf {
    preferred_db_path(explicit)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSource {
    Local,
    Cloud,
}

/// Where audio/lyric assets live: local files under `media_path`, or a cloud
/// object store addressed by base URL + prefix.
#[derive(Debug, Clone)]
pub struct AssetSettings {
    pub source: AssetSource,
    pub base_url: Option<String>,
    pub prefix: String,
}

impl AssetSettings {
    pub fn from_env() -> AssetSettings {
        let source = match std::env::var("ASSET_SOURCE").as_deref() {
            Ok("cloud") => AssetSource::Cloud,
            _ => AssetSource::Local,
        };
        let base_url = env_nonempty("ASSET_BASE_URL").map(|url| url.trim_end_matches('/').to_string());
        let prefix = env_nonempty("ASSET_PREFIX")
            .map(|p| p.trim_matches('/').to_string())
            .unwrap_or_else(|| "albums".to_string());
        AssetSettings {
            source,
            base_url,
            prefix,
        }
    }

    pub fn is_cloud(&self) -> bool {
        self.source == AssetSource::Cloud
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_db_path_heads_the_chain() {
        let explicit = PathBuf::from("/srv/player/player.db");
        let candidates = db_candidate_paths(Some(&explicit));
        assert_eq!(candidates[0], explicit);
        assert!(candidates.len() >= 2);
        let last = candidates.last().unwrap();
        assert!(last.ends_with(PathBuf::from("lizhi-player").join(DB_FILE_NAME)));
    }

    #[test]
    fn resolve_uses_cli_values() {
        let cli = CliConfig {
            port: 3001,
            media_path: Some(PathBuf::from("/media/albums")),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.media_path, PathBuf::from("/media/albums"));
        assert!(!config.secure_cookies);
    }

    #[test]
    fn toml_overrides_cli() {
        let cli = CliConfig {
            port: 3001,
            session_days: Some(30),
            ..Default::default()
        };
        let file = FileConfig {
            port: Some(4000),
            session_days: Some(7),
            secure_cookies: Some(true),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, Some(file)).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.session_max_age_seconds, 7 * 24 * 60 * 60);
        assert!(config.secure_cookies);
    }

    #[test]
    fn session_days_default_to_two_weeks() {
        let config = AppConfig::resolve(&CliConfig::default(), None).unwrap();
        assert_eq!(config.session_max_age_seconds, 14 * 24 * 60 * 60);
    }
}
