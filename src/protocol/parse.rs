//! Envelope-first parsing of inbound protocol lines.
//!
//! A line is decoded twice: once into a minimal envelope that only looks at
//! `type`, then fully into the struct that `type` selects. This keeps the
//! error for an unroutable line separate from the error for a routable line
//! with a bad payload.

use std::fmt::{Display, Formatter};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::message::{
    AnswerMessage, BlockedMessage, CancelMessage, CompleteMessage, HeartbeatMessage, InitMessage,
    Message, TaskMessage,
};

/// Why a line could not be turned into a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line is not a JSON object.
    InvalidJson(String),
    /// `type` is absent, null, or an empty string.
    MissingType,
    /// `type` is present but not a string.
    InvalidType(String),
    /// `type` does not name one of the seven known messages.
    UnknownType(String),
    /// `type` is known but the payload does not match its shape.
    InvalidMessage {
        /// Wire name of the message type.
        kind: &'static str,
        /// Decoder error text.
        detail: String,
    },
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(detail) => write!(f, "invalid json: {detail}"),
            Self::MissingType => write!(f, "missing message type"),
            Self::InvalidType(raw) => write!(f, "message type must be a string, got {raw}"),
            Self::UnknownType(kind) => write!(f, "unknown message type: {kind:?}"),
            Self::InvalidMessage { kind, detail } => write!(f, "invalid {kind} message: {detail}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// The routing view of a line. Everything besides `type` is ignored here.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    kind: Option<Value>,
}

/// Parse one line from the agent into a typed [`Message`].
///
/// Unrecognised extra fields are ignored and optional fields may be absent.
///
/// # Errors
///
/// - [`ParseError::InvalidJson`] — empty input or not a JSON object.
/// - [`ParseError::MissingType`] — no usable `type` field.
/// - [`ParseError::InvalidType`] — `type` is not a string.
/// - [`ParseError::UnknownType`] — `type` is not one of the seven messages.
/// - [`ParseError::InvalidMessage`] — the payload does not fit its type.
pub fn parse(line: &str) -> Result<Message, ParseError> {
    let envelope: Envelope =
        serde_json::from_str(line).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let kind = match envelope.kind {
        None | Some(Value::Null) => return Err(ParseError::MissingType),
        Some(Value::String(kind)) if kind.is_empty() => return Err(ParseError::MissingType),
        Some(Value::String(kind)) => kind,
        Some(other) => return Err(ParseError::InvalidType(other.to_string())),
    };

    match kind.as_str() {
        "init" => decode::<InitMessage>(line, "init").map(Message::Init),
        "task" => decode::<TaskMessage>(line, "task").map(Message::Task),
        "cancel" => decode::<CancelMessage>(line, "cancel").map(Message::Cancel),
        "answer" => decode::<AnswerMessage>(line, "answer").map(Message::Answer),
        "heartbeat" => decode::<HeartbeatMessage>(line, "heartbeat").map(Message::Heartbeat),
        "blocked" => decode::<BlockedMessage>(line, "blocked").map(Message::Blocked),
        "complete" => decode::<CompleteMessage>(line, "complete").map(Message::Complete),
        _ => Err(ParseError::UnknownType(kind)),
    }
}

/// Serialise a message as one compact JSON line terminated by `\n`.
///
/// # Errors
///
/// Returns the serializer error; this only happens for non-finite floats.
pub fn encode(msg: &Message) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

fn decode<T: DeserializeOwned>(line: &str, kind: &'static str) -> Result<T, ParseError> {
    serde_json::from_str(line).map_err(|e| ParseError::InvalidMessage {
        kind,
        detail: e.to_string(),
    })
}
