//! Runtime configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via PROCFLOW_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Restart policy applied by a manager to a faulted child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Faulted children stay down.
    #[default]
    Never,
    /// Faulted children are restarted fresh: history survives, the
    /// in-memory context resets, unconsumed mailbox events are dropped.
    OnFault,
}

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Restart policy for faulted instances.
    pub restart: RestartPolicy,
    /// Maximum restarts per child before it stays down.
    pub max_restarts: u32,
    /// Telemetry broadcast channel capacity.
    pub telemetry_capacity: usize,
    /// Attach the default telemetry logger (signals -> tracing).
    pub telemetry_logger: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            restart: RestartPolicy::Never,
            max_restarts: 3,
            telemetry_capacity: 1024,
            telemetry_logger: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, String),
}

impl Config {
    /// Loads configuration from file, then applies environment variable
    /// overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("PROCFLOW_CONFIG") {
            config = Self::from_file(&path)?;
        }
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(policy) = std::env::var("PROCFLOW_RESTART") {
            match policy.as_str() {
                "never" => self.restart = RestartPolicy::Never,
                "on_fault" => self.restart = RestartPolicy::OnFault,
                other => tracing::warn!("unknown PROCFLOW_RESTART value '{}'", other),
            }
        }
        if let Ok(n) = std::env::var("PROCFLOW_MAX_RESTARTS") {
            if let Ok(parsed) = n.parse() {
                self.max_restarts = parsed;
            }
        }
        if let Ok(n) = std::env::var("PROCFLOW_TELEMETRY_CAPACITY") {
            if let Ok(parsed) = n.parse() {
                self.telemetry_capacity = parsed;
            }
        }
        if let Ok(v) = std::env::var("PROCFLOW_TELEMETRY_LOGGER") {
            self.telemetry_logger = matches!(v.as_str(), "1" | "true" | "yes");
        }
    }
}
