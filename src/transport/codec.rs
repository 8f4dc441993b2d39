//! Length-prefixed framing
//!
//! A frame is a 4-byte unsigned big-endian length followed by that many
//! bytes of UTF-8 JSON (one [`Envelope`]). The decoder accumulates inbound
//! bytes and hands out complete frames only; a partial prefix or body stays
//! buffered until more bytes arrive.

use bytes::{Buf, BufMut, BytesMut};

use super::message::Envelope;
use crate::utils::error::CodecError;

/// Size of the length prefix.
pub const PREFIX_LEN: usize = 4;

/// Default bound on a single inbound frame body.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Serializes `envelope` and appends one frame to `out`.
pub fn encode_frame(envelope: &Envelope, out: &mut BytesMut) -> Result<(), CodecError> {
    let body = serde_json::to_vec(envelope)?;
    let len = u32::try_from(body.len()).map_err(|_| CodecError::FrameTooLarge {
        len: body.len(),
        max: u32::MAX as usize,
    })?;
    out.reserve(PREFIX_LEN + body.len());
    out.put_u32(len);
    out.put_slice(&body);
    Ok(())
}

/// Incremental frame extractor over a growable inbound buffer.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_frame_size,
        }
    }

    /// Raw inbound buffer, socket reads append here.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Pops the next complete frame.
    ///
    /// `Ok(None)` means more bytes are needed. `Err(CodecError::Json)` consumes
    /// the offending frame, so decoding can continue with the next one.
    /// `Err(CodecError::FrameTooLarge)` leaves the buffer untouched: the stream
    /// can not be resynchronised and the caller should drop the connection.
    pub fn next_frame(&mut self) -> Result<Option<Envelope>, CodecError> {
        if self.buffer.len() < PREFIX_LEN {
            return Ok(None);
        }
        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&self.buffer[..PREFIX_LEN]);
        let len = u32::from_be_bytes(prefix) as usize;
        if len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                len,
                max: self.max_frame_size,
            });
        }
        if self.buffer.len() - PREFIX_LEN < len {
            return Ok(None);
        }
        self.buffer.advance(PREFIX_LEN);
        let body = self.buffer.split_to(len);
        let envelope = serde_json::from_slice(&body)?;
        Ok(Some(envelope))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}
