//! Control plane configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub fleet: FleetConfig,
    pub workflow: WorkflowConfig,
    pub store: StoreConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Deadline for a single agent capability call.
    pub capability_timeout_ms: u64,
    /// An agent not heard from for this long is stale.
    pub heartbeat_stale_after_secs: u64,
    pub sweep_interval_secs: u64,
    /// Redump resolutions running at once.
    pub redump_concurrency: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            capability_timeout_ms: 5_000,
            heartbeat_stale_after_secs: 90,
            sweep_interval_secs: 30,
            redump_concurrency: 4,
        }
    }
}

impl FleetConfig {
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_millis(self.capability_timeout_ms)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_stale_after_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Default caller deadline for name-based dispatch.
    pub timeout_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

impl WorkflowConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// Durable state file; in-memory when absent.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl ControlPlaneConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = |name: &str| ConfigError::Invalid(format!("{name} must be greater than zero"));
        if self.fleet.capability_timeout_ms == 0 {
            return Err(zero("fleet.capability_timeout_ms"));
        }
        if self.fleet.heartbeat_stale_after_secs == 0 {
            return Err(zero("fleet.heartbeat_stale_after_secs"));
        }
        if self.fleet.sweep_interval_secs == 0 {
            return Err(zero("fleet.sweep_interval_secs"));
        }
        if self.fleet.redump_concurrency == 0 {
            return Err(zero("fleet.redump_concurrency"));
        }
        if self.workflow.timeout_ms == 0 {
            return Err(zero("workflow.timeout_ms"));
        }
        Ok(())
    }
}
