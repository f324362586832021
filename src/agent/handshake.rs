//! Handshake sent to a freshly spawned agent.
//!
//! The supervisor writes exactly two lines to the agent's stdin and nothing
//! else for the rest of the agent's life:
//!
//! 1. **`init`** — protocol version, heartbeat interval, token budget.
//! 2. **`task`** — the single unit of work.
//!
//! Both go through [`write_message`], which encodes one JSON object per line.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::protocol::{self, InitMessage, Message, TaskMessage};
use crate::{AppError, Result};

/// Send the `init` message.
///
/// # Errors
///
/// Returns `AppError::Send` if encoding or the write fails.
pub async fn send_init<W>(stdin: &mut W, init: &InitMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_message(stdin, &Message::Init(init.clone()))
        .await
        .map_err(|e| AppError::Send(format!("failed to send init: {e}")))?;

    debug!(
        heartbeat_interval_s = init.heartbeat_interval_s,
        max_tokens = init.max_tokens,
        "handshake: init sent"
    );
    Ok(())
}

/// Send the `task` message.
///
/// # Errors
///
/// Returns `AppError::Send` if encoding or the write fails.
pub async fn send_task<W>(stdin: &mut W, task: &TaskMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_message(stdin, &Message::Task(task.clone()))
        .await
        .map_err(|e| AppError::Send(format!("failed to send task {}: {e}", task.id)))?;

    debug!(task_id = %task.id, "handshake: task sent");
    Ok(())
}

/// Encode `msg` as a single line and write it to `writer`.
///
/// # Errors
///
/// Returns an `InvalidData` I/O error if the message cannot be encoded, or
/// the underlying write/flush error (typically `BrokenPipe` once the agent
/// has exited).
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = protocol::encode(msg).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("json serialisation failed: {e}"),
        )
    })?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
