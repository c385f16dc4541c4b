//! Message framing and transport bindings.
//!
//! Messages are newline-delimited JSON. Both bindings (child-process stdio
//! and TCP) reduce to a byte reader plus a byte writer, so everything above
//! this module is binding-agnostic.

use std::str::FromStr;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};

use crate::error::{Error, Result};

/// Maximum size of one framed message (1MB).
/// Sized for large tool outputs such as a full knowledge-base dump.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8050;

/// Which binding carries the channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Parent/child over the child's stdin/stdout.
    #[default]
    Stdio,
    /// Host listens on a TCP socket, orchestrator connects.
    Tcp,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "tcp" => Ok(Self::Tcp),
            other => Err(format!("unknown transport '{other}' (expected stdio or tcp)")),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One decoded line, or the marker left by a line that was too long.
enum Frame {
    Line(String),
    Oversized,
}

/// [`LinesCodec`] that reports an over-long line as a frame.
///
/// `LinesCodec` already discards the rest of such a line; surfacing it as
/// an item instead of an error keeps `FramedRead` decoding whatever is
/// buffered behind it.
struct FrameCodec(LinesCodec);

impl FrameCodec {
    fn lift(
        decoded: std::result::Result<Option<String>, LinesCodecError>,
    ) -> std::result::Result<Option<Frame>, LinesCodecError> {
        match decoded {
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::Oversized)),
            other => other.map(|line| line.map(Frame::Line)),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> std::result::Result<Option<Frame>, LinesCodecError> {
        Self::lift(self.0.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> std::result::Result<Option<Frame>, LinesCodecError> {
        Self::lift(self.0.decode_eof(buf))
    }
}

/// Reading half of a framed channel.
pub struct MessageReader {
    inner: FramedRead<BoxReader, FrameCodec>,
}

impl MessageReader {
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        let reader: BoxReader = Box::new(reader);
        let codec = FrameCodec(LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE));
        Self {
            inner: FramedRead::new(reader, codec),
        }
    }

    /// Next non-blank line, or `None` once the peer closed the stream.
    ///
    /// A line over [`MAX_MESSAGE_SIZE`] fails with [`Error::OutputTooLarge`]
    /// and is discarded; the reader stays usable for the lines after it.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        while let Some(frame) = self.inner.next().await {
            match frame.map_err(frame_error)? {
                Frame::Line(line) if line.trim().is_empty() => continue,
                Frame::Line(line) => return Ok(Some(line)),
                Frame::Oversized => {
                    return Err(Error::OutputTooLarge {
                        max: MAX_MESSAGE_SIZE,
                    });
                }
            }
        }
        Ok(None)
    }
}

/// Writing half of a framed channel. Callers serialize access to it.
pub struct MessageWriter {
    inner: FramedWrite<BoxWriter, LinesCodec>,
}

impl MessageWriter {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        let writer: BoxWriter = Box::new(writer);
        Self {
            inner: FramedWrite::new(writer, LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE)),
        }
    }

    /// Serialize one message and flush it.
    ///
    /// A message the peer could not read back is refused with
    /// [`Error::OutputTooLarge`] before anything is written.
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let json = serde_json::to_string(message)?;
        if json.len() > MAX_MESSAGE_SIZE {
            return Err(Error::OutputTooLarge {
                max: MAX_MESSAGE_SIZE,
            });
        }
        self.inner.send(json).await.map_err(frame_error)
    }

    pub async fn close(&mut self) -> Result<()> {
        SinkExt::<String>::close(&mut self.inner)
            .await
            .map_err(frame_error)
    }
}

fn frame_error(e: LinesCodecError) -> Error {
    match e {
        LinesCodecError::MaxLineLengthExceeded => Error::OutputTooLarge {
            max: MAX_MESSAGE_SIZE,
        },
        LinesCodecError::Io(e) => Error::Io(e),
    }
}
