//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bucket store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("tally").join("buckets.db"))
        .unwrap_or_else(|| PathBuf::from("./tally_data/buckets.db"))
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8083
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Rollover scheduler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,

    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            tick_interval_secs: default_tick_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,

    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "tally=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist; otherwise the default locations
    /// (`./tally.toml`, then the platform config dir) are probed and
    /// built-in defaults apply when none is present. Environment overrides
    /// are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path() {
                Some(p) => Self::from_file(&p)?,
                None => Config::default(),
            },
        };

        config.apply_env();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// First existing config file among the default locations.
    fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from("tally.toml");
        if local.exists() {
            return Some(local);
        }

        let user = dirs::config_dir().map(|p| p.join("tally").join("config.toml"));
        user.filter(|p| p.exists())
    }

    /// Apply environment variable overrides.
    fn apply_env(&mut self) {
        if let Ok(db_path) = std::env::var("TALLY_DB_PATH") {
            self.store.db_path = PathBuf::from(db_path);
        }
        if let Ok(host) = std::env::var("TALLY_API_HOST") {
            self.api.host = host;
        }
        if let Ok(port) = std::env::var("TALLY_API_PORT") {
            if let Ok(port) = port.parse() {
                self.api.port = port;
            }
        }
    }
}
