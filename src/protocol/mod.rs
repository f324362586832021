//! Line-delimited JSON protocol spoken between the supervisor and its agent.
//!
//! | `type`      | Direction     | Struct                 |
//! |-------------|---------------|------------------------|
//! | `init`      | → agent       | [`InitMessage`]        |
//! | `task`      | → agent       | [`TaskMessage`]        |
//! | `cancel`    | → agent       | [`CancelMessage`]      |
//! | `answer`    | → agent       | [`AnswerMessage`]      |
//! | `heartbeat` | → supervisor  | [`HeartbeatMessage`]   |
//! | `blocked`   | → supervisor  | [`BlockedMessage`]     |
//! | `complete`  | → supervisor  | [`CompleteMessage`]    |

pub mod message;
pub mod parse;

pub use message::{
    AnswerMessage, BlockedMessage, CancelMessage, CompleteMessage, HeartbeatMessage, InitMessage,
    Message, TaskMessage,
};
pub use parse::{encode, parse, ParseError};

/// Protocol version stamped on every outbound message.
///
/// Bump when message shapes change incompatibly.
pub const PROTOCOL_VERSION: u32 = 1;
