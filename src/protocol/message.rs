//! Wire message types exchanged with the agent.
//!
//! Every message carries `v` (the protocol version) and is routed by its
//! `type` field. Optional fields decode to their empty value when absent and
//! are omitted entirely when empty on encode.

use serde::{Deserialize, Serialize};

use super::PROTOCOL_VERSION;

// ── Orchestrator → agent ──────────────────────────────────────────────────────

/// First message sent after spawn: how the agent should pace itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitMessage {
    /// Protocol version.
    #[serde(rename = "v")]
    pub version: u32,
    /// How often the agent should send a heartbeat, in whole seconds.
    pub heartbeat_interval_s: u64,
    /// Token budget for the task; `0` means unlimited.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_tokens: u64,
}

impl InitMessage {
    /// Build an `init` message for the current protocol version.
    #[must_use]
    pub fn new(heartbeat_interval_s: u64, max_tokens: u64) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            heartbeat_interval_s,
            max_tokens,
        }
    }
}

/// Assigns the one task the agent performs during its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskMessage {
    /// Protocol version.
    #[serde(rename = "v")]
    pub version: u32,
    /// Unique task identifier.
    pub id: String,
    /// What the agent should do.
    pub prompt: String,
    /// Working directory of the agent.
    pub repo: String,
    /// Optional path to a spec file.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub spec: String,
}

impl TaskMessage {
    /// Build a `task` message for the current protocol version.
    #[must_use]
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            id: id.into(),
            prompt: prompt.into(),
            repo: repo.into(),
            spec: String::new(),
        }
    }

    /// Attach a spec file path.
    #[must_use]
    pub fn with_spec(mut self, spec: impl Into<String>) -> Self {
        self.spec = spec.into();
        self
    }
}

/// Graceful-stop request. Not sent by the supervisor yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelMessage {
    /// Protocol version.
    #[serde(rename = "v")]
    pub version: u32,
    /// Task being cancelled.
    pub id: String,
    /// Why the task is being cancelled.
    pub reason: String,
}

/// Reply to a [`BlockedMessage`]. Not sent by the supervisor yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerMessage {
    /// Protocol version.
    #[serde(rename = "v")]
    pub version: u32,
    /// Task the answer belongs to.
    pub id: String,
    /// Answer text.
    pub response: String,
}

// ── Agent → orchestrator ──────────────────────────────────────────────────────

/// Periodic liveness and progress report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatMessage {
    /// Protocol version.
    #[serde(rename = "v")]
    pub version: u32,
    /// Task identifier.
    pub id: String,
    /// Agent state, usually `running`.
    pub state: String,
    /// Tool currently in use.
    pub tool: String,
    /// Free-text progress detail.
    pub detail: String,
    /// Resident memory estimate in megabytes.
    pub rss_mb: f64,
    /// Cumulative input tokens.
    pub tokens_in: u64,
    /// Cumulative output tokens.
    pub tokens_out: u64,
    /// Seconds since the task started.
    pub elapsed_s: f64,
}

/// The agent needs input to proceed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockedMessage {
    /// Protocol version.
    #[serde(rename = "v")]
    pub version: u32,
    /// Task identifier.
    pub id: String,
    /// Human-readable question.
    pub question: String,
    /// Structured choices, if the question has any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// Terminal message; the agent exits after sending it.
///
/// Any `state` counts as a finished run from the supervisor's point of view,
/// including agent-reported failures carried in `error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompleteMessage {
    /// Protocol version.
    #[serde(rename = "v")]
    pub version: u32,
    /// Task identifier.
    pub id: String,
    /// Final state reported by the agent (e.g. `done`, `failed`).
    pub state: String,
    /// Success summary.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    /// Error text when the agent itself failed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// Files the agent changed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_changed: Vec<String>,
    /// Final input token total.
    pub tokens_in: u64,
    /// Final output token total.
    pub tokens_out: u64,
    /// Total seconds spent on the task.
    pub elapsed_s: f64,
}

impl CompleteMessage {
    /// Whether the agent reported its own failure through `error`.
    #[must_use]
    pub fn reports_error(&self) -> bool {
        !self.error.is_empty()
    }
}

// ── Closed message set ────────────────────────────────────────────────────────

/// Every protocol message, tagged by its wire `type`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// `init` (orchestrator → agent).
    Init(InitMessage),
    /// `task` (orchestrator → agent).
    Task(TaskMessage),
    /// `cancel` (orchestrator → agent).
    Cancel(CancelMessage),
    /// `answer` (orchestrator → agent).
    Answer(AnswerMessage),
    /// `heartbeat` (agent → orchestrator).
    Heartbeat(HeartbeatMessage),
    /// `blocked` (agent → orchestrator).
    Blocked(BlockedMessage),
    /// `complete` (agent → orchestrator).
    Complete(CompleteMessage),
}

impl Message {
    /// Wire name of the message type.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Task(_) => "task",
            Self::Cancel(_) => "cancel",
            Self::Answer(_) => "answer",
            Self::Heartbeat(_) => "heartbeat",
            Self::Blocked(_) => "blocked",
            Self::Complete(_) => "complete",
        }
    }

    /// Protocol version carried by the message.
    #[must_use]
    pub fn version(&self) -> u32 {
        match self {
            Self::Init(m) => m.version,
            Self::Task(m) => m.version,
            Self::Cancel(m) => m.version,
            Self::Answer(m) => m.version,
            Self::Heartbeat(m) => m.version,
            Self::Blocked(m) => m.version,
            Self::Complete(m) => m.version,
        }
    }
}

macro_rules! impl_from_message {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Message {
                fn from(msg: $ty) -> Self {
                    Self::$variant(msg)
                }
            }
        )*
    };
}

impl_from_message!(
    Init(InitMessage),
    Task(TaskMessage),
    Cancel(CancelMessage),
    Answer(AnswerMessage),
    Heartbeat(HeartbeatMessage),
    Blocked(BlockedMessage),
    Complete(CompleteMessage),
);

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if passes by reference.
fn is_zero(value: &u64) -> bool {
    *value == 0
}
