//! Agent stdout reader task.
//!
//! Reads newline-delimited JSON from the agent's stdout, parses each line
//! with [`protocol::parse`], and forwards one [`InboundItem`] per line through
//! a tokio [`mpsc`] channel, in line order.
//!
//! | Input                  | Forwarded item                         |
//! |------------------------|----------------------------------------|
//! | valid protocol line    | `Ok(Message)`                          |
//! | unparseable line       | `Err(InboundError::Parse)`, keep going |
//! | non-UTF-8 line         | `Err(InboundError::Parse)`, keep going |
//! | over-long line         | `Err(InboundError::Frame)`, keep going |
//! | blank line             | nothing                                |
//! | read failure           | `Err(InboundError::Frame)`, then stop  |
//! | EOF                    | nothing, stop                          |
//!
//! The sender is dropped when the task stops, so the receiving side sees the
//! channel close as its own "no more messages" event.

use std::fmt::{Display, Formatter};

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::codec::{FrameError, LineCodec, RawLine};
use crate::protocol::{self, Message, ParseError};

/// Capacity of the reader → supervisor queue.
pub const READER_QUEUE_DEPTH: usize = 64;

/// One outcome per inbound line.
pub type InboundItem = std::result::Result<Message, InboundError>;

/// A line that did not yield a message.
#[derive(Debug)]
pub enum InboundError {
    /// The line was framed correctly but is not a valid message.
    Parse {
        /// 1-based line number on the agent's stdout.
        line_no: u64,
        /// Why parsing failed.
        error: ParseError,
    },
    /// The stream could not be framed or read.
    Frame(FrameError),
}

impl Display for InboundError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse { line_no, error } => write!(f, "line {line_no}: {error}"),
            Self::Frame(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for InboundError {}

/// Reader task body: forwards one item per stdout line to `item_tx`.
///
/// Returns on EOF, on a read failure (after forwarding it), when `cancel`
/// fires, or when the receiver has been dropped.
pub async fn run_reader<R>(stdout: R, item_tx: mpsc::Sender<InboundItem>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, LineCodec::new());
    let mut line_no: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("agent reader: cancellation received, stopping");
                break;
            }

            next = framed.next() => next,
        };

        let item = match next {
            None => {
                debug!(lines = line_no, "agent reader: EOF");
                break;
            }

            Some(Err(FrameError::Io(err))) => {
                warn!(error = %err, "agent reader: read failed, stopping");
                forward(&item_tx, Err(InboundError::Frame(FrameError::Io(err)))).await;
                break;
            }

            Some(Err(FrameError::LineTooLong) | Ok(RawLine::TooLong)) => {
                line_no += 1;
                warn!(line_no, "agent reader: line too long, discarded");
                Err(InboundError::Frame(FrameError::LineTooLong))
            }

            Some(Ok(RawLine::Line(raw))) => {
                line_no += 1;
                match decode_line(&raw) {
                    Ok(None) => continue,
                    Ok(Some(msg)) => Ok(msg),
                    Err(error) => {
                        warn!(
                            line_no,
                            %error,
                            raw_line = %String::from_utf8_lossy(&raw),
                            "agent reader: parse error"
                        );
                        Err(InboundError::Parse { line_no, error })
                    }
                }
            }
        };

        if !forward(&item_tx, item).await {
            debug!("agent reader: receiver closed, stopping");
            break;
        }
    }
}

/// Spawn [`run_reader`] on the runtime and return the receiving end.
#[must_use]
pub fn spawn_reader<R>(
    stdout: R,
    cancel: CancellationToken,
) -> (mpsc::Receiver<InboundItem>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (item_tx, item_rx) = mpsc::channel(READER_QUEUE_DEPTH);
    let handle = tokio::spawn(run_reader(stdout, item_tx, cancel));
    (item_rx, handle)
}

/// Parse one raw line. `Ok(None)` for a blank line.
fn decode_line(raw: &[u8]) -> Result<Option<Message>, ParseError> {
    let line = std::str::from_utf8(raw)
        .map_err(|err| ParseError::InvalidJson(format!("line is not valid UTF-8: {err}")))?;
    if line.trim().is_empty() {
        return Ok(None);
    }
    protocol::parse(line).map(Some)
}

async fn forward(item_tx: &mpsc::Sender<InboundItem>, item: InboundItem) -> bool {
    item_tx.send(item).await.is_ok()
}
