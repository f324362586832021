//! Line framing for the agent's stdout.
//!
//! Wraps [`tokio_util::codec::AnyDelimiterCodec`] split on `\n` with a
//! maximum line length, so an agent that never writes a newline cannot make
//! the supervisor buffer without bound. Lines are yielded as raw bytes: text
//! decoding is left to the reader so that one undecodable line is reported
//! on its own instead of ending the stream. Use it with
//! [`tokio_util::codec::FramedRead`].

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};

/// Maximum line length accepted from an agent: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// One framed unit of agent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLine {
    /// A complete line, without its `\n` or a trailing `\r`.
    Line(Bytes),
    /// A line longer than [`MAX_LINE_BYTES`]; its content was discarded up
    /// to and including the next newline.
    TooLong,
}

/// A framing failure on the agent's stdout.
#[derive(Debug)]
pub enum FrameError {
    /// A line exceeded [`MAX_LINE_BYTES`].
    LineTooLong,
    /// The underlying read failed.
    Io(std::io::Error),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LineTooLong => write!(f, "line too long: exceeded {MAX_LINE_BYTES} bytes"),
            Self::Io(err) => write!(f, "read failed: {err}"),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Newline-delimited decoder for agent output.
///
/// Only read failures are errors. An over-long line is an item
/// ([`RawLine::TooLong`]) so that `FramedRead` keeps going past it.
#[derive(Debug)]
pub struct LineCodec(AnyDelimiterCodec);

impl LineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            b"\n".to_vec(),
            MAX_LINE_BYTES,
        ))
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = RawLine;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        frame(self.0.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        frame(self.0.decode_eof(src))
    }
}

fn frame(
    decoded: Result<Option<Bytes>, AnyDelimiterCodecError>,
) -> Result<Option<RawLine>, FrameError> {
    match decoded {
        Ok(Some(line)) => Ok(Some(RawLine::Line(strip_cr(line)))),
        Ok(None) => Ok(None),
        Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(RawLine::TooLong)),
        Err(AnyDelimiterCodecError::Io(err)) => Err(FrameError::Io(err)),
    }
}

fn strip_cr(mut line: Bytes) -> Bytes {
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    line
}
