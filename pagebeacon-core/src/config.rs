//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/pagebeacon/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/pagebeacon/` (~/.config/pagebeacon/)
//! - State/Logs: `$XDG_STATE_HOME/pagebeacon/` (~/.local/state/pagebeacon/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Tracker configuration
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Tracker configuration
///
/// Set once when the tracker is initialized and read-only afterwards.
#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    /// Ingestion endpoint that receives one POST per payload
    #[serde(alias = "gas_url")]
    pub endpoint_url: Option<String>,

    /// Site identifier stamped on every payload
    #[serde(default)]
    pub site_id: String,

    /// Enable/disable tracking entirely
    #[serde(default)]
    pub enabled: bool,

    /// Log every enqueued payload and every acknowledged delivery
    #[serde(default)]
    pub debug: bool,

    /// Queue length that triggers an immediate flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Idle time after the last enqueue before a sub-threshold batch is flushed
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,

    /// Absolute bound on how long the oldest queued payload may wait.
    ///
    /// Unset keeps the reset-on-every-enqueue behavior, where a steady
    /// trickle below `batch_size` can postpone the flush indefinitely.
    #[serde(default)]
    pub max_wait_ms: Option<u64>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            site_id: String::new(),
            enabled: false,
            debug: false,
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            max_wait_ms: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_timeout_ms() -> u64 {
    5000
}

fn default_timeout_secs() -> u64 {
    30
}

impl TrackerConfig {
    /// Enabled configuration pointing at `endpoint_url`, with defaults elsewhere
    pub fn new(endpoint_url: impl Into<String>, site_id: impl Into<String>) -> Self {
        Self {
            endpoint_url: Some(endpoint_url.into()),
            site_id: site_id.into(),
            enabled: true,
            ..Default::default()
        }
    }

    /// Check if the tracker is enabled and has an endpoint to send to
    pub fn is_ready(&self) -> bool {
        self.enabled && self.endpoint_url.is_some()
    }

    /// Validate configuration, returning error message if invalid
    ///
    /// The endpoint is required even when tracking is disabled.
    pub fn validate(&self) -> Result<()> {
        let endpoint = self
            .endpoint_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::Config("tracker.endpoint_url is required".to_string()))?;

        reqwest::Url::parse(endpoint).map_err(|e| {
            Error::Config(format!(
                "tracker.endpoint_url is not a valid URL ({}): {}",
                endpoint, e
            ))
        })?;

        if self.batch_size == 0 {
            return Err(Error::Config(
                "tracker.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.max_wait_ms == Some(0) {
            return Err(Error::Config(
                "tracker.max_wait_ms must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Idle timeout before a sub-threshold batch is flushed
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Absolute wait bound for the oldest queued payload, if configured
    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }

    /// HTTP request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/pagebeacon/config.toml` (~/.config/pagebeacon/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("pagebeacon").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/pagebeacon/` (~/.local/state/pagebeacon/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("pagebeacon")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/pagebeacon/pagebeacon.log` (~/.local/state/pagebeacon/pagebeacon.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("pagebeacon.log")
    }
}
