use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Optional TOML configuration file. Values present here override the CLI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub db_path: Option<String>,
    pub media_path: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub session_days: Option<u32>,
    pub secure_cookies: Option<bool>,
    pub frontend_dir_path: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<FileConfig> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_config() {
        let parsed: FileConfig = toml::from_str(
            r#"
            port = 4000
            session_days = 7
            "#,
        )
        .unwrap();
        assert_eq!(parsed.port, Some(4000));
        assert_eq!(parsed.session_days, Some(7));
        assert!(parsed.db_path.is_none());
        assert!(parsed.secure_cookies.is_none());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(FileConfig::load(Path::new("/nonexistent/config.toml")).is_err());
    }
}
