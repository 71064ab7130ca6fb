//! Line framing for the command station stream.
//!
//! Outgoing commands are wrapped as `<command>\n`. Incoming traffic is
//! one `<...>` frame per line; the decoder yields the text between the
//! angle brackets and drops anything it cannot frame.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Longest line the decoder buffers before giving up on a terminator.
pub const MAX_FRAME_LEN: usize = 1024;

/// Codec for `<...>` framed, newline-delimited ASCII lines.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Bytes already scanned for a newline in the current buffer.
    scanned: usize,
    /// Set while skipping the remainder of an oversized line.
    discarding: bool,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Strip the frame wrapper from one raw line.
///
/// Returns `None` for blank lines, empty frames and lines that are not
/// wrapped in `<` and `>`.
pub fn unwrap_frame(raw: &str) -> Option<&str> {
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }

    let Some(inner) = line.strip_prefix('<').and_then(|l| l.strip_suffix('>')) else {
        tracing::warn!(line, "Invalid frame from command station");
        return None;
    };

    let inner = inner.trim();
    if inner.is_empty() {
        tracing::warn!("Empty frame from command station");
        return None;
    }
    Some(inner)
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        loop {
            let newline = buf[self.scanned..].iter().position(|b| *b == b'\n');

            let Some(offset) = newline else {
                if buf.len() > MAX_FRAME_LEN {
                    tracing::warn!(len = buf.len(), "Discarding oversized frame");
                    buf.clear();
                    self.scanned = 0;
                    self.discarding = true;
                } else {
                    self.scanned = buf.len();
                }
                return Ok(None);
            };

            let end = self.scanned + offset;
            let raw = buf.split_to(end + 1);
            self.scanned = 0;

            if self.discarding {
                // Tail of a line that was already dropped.
                self.discarding = false;
                continue;
            }
            if end > MAX_FRAME_LEN {
                tracing::warn!(len = end, "Discarding oversized frame");
                continue;
            }

            let text = String::from_utf8_lossy(&raw[..end]);
            if let Some(inner) = unwrap_frame(&text) {
                return Ok(Some(inner.to_owned()));
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if buf.has_remaining() {
            tracing::debug!(len = buf.len(), "Dropping unterminated fragment at end of stream");
            buf.clear();
        }
        self.scanned = 0;
        self.discarding = false;
        Ok(None)
    }
}

impl Encoder<&str> for FrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, command: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(command.len() + 3);
        dst.put_u8(b'<');
        dst.put_slice(command.as_bytes());
        dst.put_slice(b">\n");
        Ok(())
    }
}
