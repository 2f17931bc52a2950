//! Length-prefixed framing (panic-free, resumable).
//!
//! Parsing rules:
//! - Never index (`buf[0]`); always check `remaining()`/`len()` before reading.
//! - A partial header or body is left in the buffer untouched until more
//!   bytes arrive (stream reassembly, not datagram semantics).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CastError, Result};
use crate::protocol::envelope::Envelope;

/// Size of the big-endian length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest body the receiver is allowed to send by default (64 KiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// Serialize an envelope and prepend its length, as one contiguous buffer.
///
/// Writers must emit the returned bytes with a single write so two frames can
/// never interleave on the socket.
pub fn encode_frame(env: &Envelope) -> Result<Bytes> {
    let body = env.encode();
    let len = u32::try_from(body.len())
        .map_err(|_| CastError::Frame(format!("envelope too large: {} bytes", body.len())))?;

    let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + body.len());
    out.put_u32(len);
    out.put_slice(&body);
    Ok(out.freeze())
}

/// Incremental frame decoder over a growing byte buffer.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    max_frame_bytes: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Take one complete envelope off the front of `buf`.
    ///
    /// Returns `Ok(None)` when fewer than 4 (or `L`) bytes are buffered; the
    /// buffer is not modified in that case. A prefix above the configured
    /// maximum or an undecodable body is a `Frame` error.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Envelope>> {
        if buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut peek: &[u8] = buf.as_ref();
        let len = peek.get_u32() as usize;

        if len > self.max_frame_bytes {
            return Err(CastError::Frame(format!(
                "frame length {len} exceeds maximum {}",
                self.max_frame_bytes
            )));
        }
        if buf.len() < FRAME_HEADER_LEN + len {
            tracing::trace!(want = len, have = buf.len() - FRAME_HEADER_LEN, "partial frame");
            // Reserve up front so the next read can complete the frame.
            buf.reserve(FRAME_HEADER_LEN + len - buf.len());
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_LEN);
        let body = buf.split_to(len);
        Envelope::decode(&body).map(Some)
    }
}
