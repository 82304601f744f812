/// Configuration utilities - loading and access helpers
///
/// - Loading configuration from disk (defaults when the file is absent)
/// - Saving the effective configuration
/// - A process-wide instance for the binary
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::fs;
use std::path::Path;

use super::schemas::Config;
use crate::logger::{self, LogTag};

/// Global configuration instance
pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

/// Default configuration file path
pub const CONFIG_FILE_PATH: &str = "data/wshub.toml";

impl Config {
    /// Load from a TOML file, falling back to defaults when it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            logger::warning(
                LogTag::System,
                &format!("Config file '{}' not found, using default values", path.display()),
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config = toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;

        Ok(config)
    }

    /// Write the configuration as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create '{}'", parent.display()))?;
            }
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file '{}'", path.display()))?;

        Ok(())
    }
}

/// Load configuration from disk and initialize the global CONFIG
pub fn load_config_from_path(path: &str) -> Result<()> {
    let config = Config::load(path)?;

    CONFIG
        .set(RwLock::new(config))
        .map_err(|_| anyhow::anyhow!("Config already initialized"))?;

    Ok(())
}

/// Run a closure against the global configuration
///
/// Falls back to defaults when the config has not been loaded.
pub fn with_config<R>(f: impl FnOnce(&Config) -> R) -> R {
    match CONFIG.get() {
        Some(lock) => f(&lock.read()),
        None => f(&Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthMode;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.hub.client_send_size, 20);
        assert_eq!(config.hub.breaker_capacity, 3);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[hub]\nbreaker_capacity = 1\nauth = \"header\"\n\n[server]\nport = 9100").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.hub.breaker_capacity, 1);
        assert_eq!(config.hub.auth, AuthMode::Header);
        assert_eq!(config.hub.breaker_period_ms, 2000);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.path, "/ws");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[hub\nbroken").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_logging_block() {
        let config = Config::default();
        let file = config.logging.file_config().unwrap();
        assert_eq!(file.path, std::path::PathBuf::from("logfiles/wshub.log"));
        assert_eq!(file.max_size_bytes, 128 * 1024 * 1024);
        assert_eq!(file.max_backups, 30);

        let config: Config = toml::from_str("[logging]\nfile_enabled = false").unwrap();
        assert!(config.logging.file_config().is_none());
    }

    #[test]
    fn test_save_round_trip_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/wshub.toml");

        let mut config = Config::default();
        config.server.port = 7001;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.port, 7001);
    }
}
