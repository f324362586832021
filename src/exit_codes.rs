//! Stable exit codes for the `agent-overseer` binary.
//!
//! One code per failure class, so wrapper scripts can choose between
//! retrying, alerting, and raising a budget without parsing stderr.

use crate::protocol::CompleteMessage;
use crate::AppError;

/// The agent sent `complete` without an error.
pub const OK: i32 = 0;
/// Configuration, I/O, launch, or handshake failure on the supervisor side.
pub const INVALID: i32 = 1;
/// The agent wrote a line that is not a protocol message.
pub const PROTOCOL_ERROR: i32 = 2;
/// The agent went silent past the heartbeat timeout.
pub const HEARTBEAT_TIMEOUT: i32 = 3;
/// The agent reported RSS above the budget.
pub const RESOURCE_EXCEEDED: i32 = 4;
/// The agent asked a question.
pub const BLOCKED: i32 = 5;
/// The agent exited abnormally before completing.
pub const CRASHED: i32 = 6;
/// The agent exited cleanly without completing.
pub const INCOMPLETE_EXIT: i32 = 7;
/// The agent completed but reported its own failure.
pub const AGENT_REPORTED_FAILURE: i32 = 8;

/// Exit code for a failed run.
#[must_use]
pub fn for_error(err: &AppError) -> i32 {
    match err {
        AppError::Config(_) | AppError::Io(_) | AppError::Launch(_) | AppError::Send(_) => INVALID,
        AppError::Protocol(_) => PROTOCOL_ERROR,
        AppError::HeartbeatTimeout(_) => HEARTBEAT_TIMEOUT,
        AppError::ResourceExceeded { .. } => RESOURCE_EXCEEDED,
        AppError::Blocked { .. } => BLOCKED,
        AppError::Crashed(_) => CRASHED,
        AppError::IncompleteExit => INCOMPLETE_EXIT,
    }
}

/// Exit code for a run that ended with `complete`.
#[must_use]
pub fn for_complete(complete: &CompleteMessage) -> i32 {
    if complete.reports_error() {
        AGENT_REPORTED_FAILURE
    } else {
        OK
    }
}
