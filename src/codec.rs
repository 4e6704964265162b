//! Frame codec.
//!
//! A frame is one complete JSON value. Frames are read from a byte stream by
//! locating the end of the first complete value in the read buffer, so
//! several frames may arrive in one read and one frame may arrive over many
//! reads. Bytes that cannot begin a JSON value are passed up as a frame
//! ending at the next newline, leaving the caller to reject the content
//! while the stream stays in sync. Outbound frames are written followed by a
//! single newline, which peers reading line-by-line may rely on.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::value::RawValue;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Default upper bound on the size of a single frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Errors produced while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The peer closed the connection between frames. This is the expected
    /// way for a session to end.
    #[error("connection closed by peer")]
    Eof,
    /// The peer closed the connection part way through a frame.
    #[error("connection closed inside a partial frame")]
    Truncated,
    /// A frame exceeded the configured size limit.
    #[error("frame of {len} bytes exceeds the limit of {max} bytes")]
    TooLarge {
        /// Bytes buffered for the frame so far.
        len: usize,
        /// Configured limit.
        max: usize,
    },
    /// A frame does not hold the expected message.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    /// An outbound message could not be serialized.
    #[error("failed to serialize frame: {0}")]
    Serialize(#[source] serde_json::Error),
    /// Transport error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True if the peer closed the connection cleanly.
    pub const fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

/// [`Decoder`] and [`Encoder`] for JSON frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameCodec {
    /// Create a codec that rejects frames larger than `max_frame_len`.
    pub const fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    /// The configured frame size limit.
    pub const fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    const fn too_large(&self, len: usize) -> FrameError {
        FrameError::TooLarge {
            len,
            max: self.max_frame_len,
        }
    }
}

fn skip_whitespace(buf: &mut BytesMut) {
    let n = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
    buf.advance(n);
}

/// What the head of the read buffer holds.
enum Head {
    /// A complete JSON value of this many bytes.
    Value(usize),
    /// The start of a JSON value.
    Partial,
    /// Bytes that no JSON value starts with.
    Unstructured,
}

fn head(buf: &[u8]) -> Head {
    let mut de = serde_json::Deserializer::from_slice(buf).into_iter::<&RawValue>();
    match de.next() {
        Some(Ok(_)) => Head::Value(de.byte_offset()),
        Some(Err(err)) if !err.is_eof() => Head::Unstructured,
        _ => Head::Partial,
    }
}

impl FrameCodec {
    fn take_value(&self, buf: &mut BytesMut, len: usize) -> Result<Option<Bytes>, FrameError> {
        if len > self.max_frame_len {
            return Err(self.too_large(len));
        }
        trace!(len, "decoded frame");
        Ok(Some(buf.split_to(len).freeze()))
    }

    fn take_line(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        match buf.iter().position(|b| *b == b'\n') {
            Some(len) if len > self.max_frame_len => Err(self.too_large(len)),
            Some(len) => {
                let line = buf.split_to(len).freeze();
                buf.advance(1);
                trace!(len, "decoded unstructured frame");
                Ok(Some(line))
            }
            None if buf.len() > self.max_frame_len => Err(self.too_large(buf.len())),
            None => Ok(None),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        skip_whitespace(buf);
        if buf.is_empty() {
            return Ok(None);
        }

        match head(buf) {
            Head::Value(len) => self.take_value(buf, len),
            Head::Unstructured => self.take_line(buf),
            // partial value, wait for more data
            Head::Partial => {
                if buf.len() > self.max_frame_len {
                    return Err(self.too_large(buf.len()));
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        match head(buf) {
            // the last line had no newline
            Head::Unstructured => Ok(Some(buf.split().freeze())),
            _ => Err(FrameError::Truncated),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_len {
            return Err(self.too_large(item.len()));
        }
        dst.reserve(item.len() + 1);
        dst.extend_from_slice(&item);
        dst.put_u8(b'\n');
        Ok(())
    }
}
