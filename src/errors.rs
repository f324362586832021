//! Error types shared across the application.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::agent::spawner::ExitOutcome;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering every way a supervised task can fail.
///
/// Each supervision failure is its own variant so callers can pick an
/// operator response (retry, alert, raise a budget) without string matching.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or I/O operation failure outside of supervision.
    Io(String),
    /// The agent binary could not be started or its pipes could not be set up.
    Launch(String),
    /// Writing the handshake or task message to the agent failed.
    Send(String),
    /// The agent wrote a line that is not a valid protocol message.
    Protocol(String),
    /// No valid message arrived within the configured heartbeat timeout.
    HeartbeatTimeout(Duration),
    /// The agent reported a resident set size above the configured budget.
    ResourceExceeded {
        /// Resident memory reported by the agent, in megabytes.
        rss_mb: f64,
        /// Configured ceiling, in megabytes.
        budget_mb: u64,
    },
    /// The agent asked for input that nobody can supply.
    Blocked {
        /// Question text from the agent.
        question: String,
        /// Structured choices offered with the question, if any.
        options: Vec<String>,
    },
    /// The agent exited abnormally before sending `complete`.
    Crashed(ExitOutcome),
    /// The agent exited cleanly but never sent `complete`.
    IncompleteExit,
}

impl AppError {
    /// Whether the failure was caused by the agent process itself rather
    /// than by the supervisor's own setup.
    #[must_use]
    pub fn is_agent_failure(&self) -> bool {
        !matches!(
            self,
            Self::Config(_) | Self::Io(_) | Self::Launch(_) | Self::Send(_)
        )
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::Send(msg) => write!(f, "send: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::HeartbeatTimeout(timeout) => {
                write!(f, "heartbeat timeout: agent silent for {timeout:?}")
            }
            Self::ResourceExceeded { rss_mb, budget_mb } => write!(
                f,
                "resource exceeded: agent rss {rss_mb} MB > budget {budget_mb} MB"
            ),
            Self::Blocked { question, .. } => write!(f, "blocked: {question}"),
            Self::Crashed(outcome) => write!(f, "crashed: agent {outcome}"),
            Self::IncompleteExit => write!(f, "incomplete exit: agent exited without completing"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
