//! Supervisor configuration: the runtime settings and their TOML form.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Default grace period for an agent to exit on its own after `complete`.
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(5);

/// Immutable settings for one [`Supervisor`](crate::supervisor::Supervisor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Path to the agent binary.
    pub agent_binary: PathBuf,
    /// Arguments passed to the agent binary.
    pub agent_args: Vec<String>,
    /// Maximum silence before the agent is presumed dead.
    pub heartbeat_timeout: Duration,
    /// RSS ceiling in megabytes; `0` means unlimited.
    pub max_rss_mb: u64,
    /// Token budget forwarded in `init`; `0` means unlimited.
    pub max_tokens: u64,
    /// How long to wait for the agent to exit after it sent `complete`.
    pub exit_grace: Duration,
}

impl SupervisorConfig {
    /// Build a config with no arguments, no token budget, and the default
    /// exit grace.
    #[must_use]
    pub fn new(
        agent_binary: impl Into<PathBuf>,
        heartbeat_timeout: Duration,
        max_rss_mb: u64,
    ) -> Self {
        Self {
            agent_binary: agent_binary.into(),
            agent_args: Vec::new(),
            heartbeat_timeout,
            max_rss_mb,
            max_tokens: 0,
            exit_grace: DEFAULT_EXIT_GRACE,
        }
    }

    /// Heartbeat interval announced to the agent: half the timeout, in whole
    /// seconds, so at least two heartbeats fit in one timeout window.
    #[must_use]
    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_timeout.as_secs() / 2
    }

    /// Whether `rss_mb` is over the configured ceiling.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Budgets are far below 2^52 MB.
    pub fn rss_exceeded(&self, rss_mb: f64) -> bool {
        self.max_rss_mb > 0 && rss_mb > self.max_rss_mb as f64
    }
}

fn default_heartbeat_timeout_seconds() -> u64 {
    30
}

fn default_exit_grace_seconds() -> u64 {
    DEFAULT_EXIT_GRACE.as_secs()
}

/// Configuration parsed from `overseer.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Agent binary to supervise.
    pub agent_binary: PathBuf,
    /// Arguments passed to the agent binary.
    #[serde(default)]
    pub agent_args: Vec<String>,
    /// Maximum agent silence before it is killed.
    #[serde(default = "default_heartbeat_timeout_seconds")]
    pub heartbeat_timeout_seconds: u64,
    /// RSS ceiling in megabytes; 0 means unlimited.
    #[serde(default)]
    pub max_rss_mb: u64,
    /// Token budget; 0 means unlimited.
    #[serde(default)]
    pub max_tokens: u64,
    /// Seconds to wait for the agent to exit after `complete`.
    #[serde(default = "default_exit_grace_seconds")]
    pub exit_grace_seconds: u64,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Runtime settings for the supervisor.
    #[must_use]
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            agent_binary: self.agent_binary.clone(),
            agent_args: self.agent_args.clone(),
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_seconds),
            max_rss_mb: self.max_rss_mb,
            max_tokens: self.max_tokens,
            exit_grace: Duration::from_secs(self.exit_grace_seconds),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.agent_binary.as_os_str().is_empty() {
            return Err(AppError::Config("agent_binary must not be empty".into()));
        }

        if self.heartbeat_timeout_seconds == 0 {
            return Err(AppError::Config(
                "heartbeat_timeout_seconds must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
