//! Worker configuration with TOML file support.
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration:
//!
//! ```toml
//! time_budget_secs = 240   # 0 = search until a match is found
//! max_pending = 16
//! check_interval = 1024
//! command_buffer = 64
//! log_level = "info"
//! log_format = "human"     # or "json"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use kneader_core::{DEFAULT_CHECK_INTERVAL, DEFAULT_TIME_BUDGET_SECS, MAX_CHECK_INTERVAL};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::LogFormat;
use crate::session::SessionConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("check_interval must be between 1 and {max}, got {value}")]
    CheckInterval { value: u64, max: u64 },
}

/// Configuration for a kneader worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KneaderConfig {
    /// Time budget per search in seconds (0 = unbounded)
    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: u64,

    /// Searches that may wait behind the running one before new
    /// requests are rejected
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    /// Nonces hashed between clock checks (1 to 65536)
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Capacity of the session command channel
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    /// Log filter, e.g. `"info"` or `"debug,kneader=trace"`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_time_budget_secs() -> u64 {
    DEFAULT_TIME_BUDGET_SECS
}

fn default_max_pending() -> usize {
    16
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL
}

fn default_command_buffer() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for KneaderConfig {
    fn default() -> Self {
        Self {
            time_budget_secs: default_time_budget_secs(),
            max_pending: default_max_pending(),
            check_interval: default_check_interval(),
            command_buffer: default_command_buffer(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl KneaderConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CHECK_INTERVAL).contains(&self.check_interval) {
            return Err(ConfigError::CheckInterval {
                value: self.check_interval,
                max: MAX_CHECK_INTERVAL,
            });
        }
        Ok(())
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load `path` if given, else the default location if it exists, else
    /// fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_toml_file(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::from_toml_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Time budget, `None` when unbounded
    pub fn time_budget(&self) -> Option<Duration> {
        (self.time_budget_secs > 0).then(|| Duration::from_secs(self.time_budget_secs))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            time_budget: self.time_budget(),
            max_pending: self.max_pending,
            check_interval: self.check_interval,
            command_buffer: self.command_buffer.max(1),
        }
    }
}

/// `<config dir>/kneader/config.toml`
#[cfg(feature = "cli")]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("kneader").join("config.toml"))
}

#[cfg(not(feature = "cli"))]
pub fn default_config_path() -> Option<PathBuf> {
    None
}
