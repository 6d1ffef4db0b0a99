//! Base framing codec.
//!
//! Frame layout (2 bytes header + payload):
//!
//! ```text
//! +-------------+------------------------+
//! | payload_len | payload                |
//! | 2 bytes BE  | payload_len bytes      |
//! +-------------+------------------------+
//! ```
//!
//! The payload cap derives from a 65535-byte frame buffer minus the header.

use crate::codec::Codec;
use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length header in bytes.
pub const LENGTH_HEADER_SIZE: usize = 2;

/// Frame buffer capacity addressable by the 2-byte header.
pub const FRAME_BUFFER_SIZE: usize = 65535;

/// Largest payload accepted by [`FrameCodec::encode`] (65533 bytes).
pub const MAX_FRAME_PAYLOAD: usize = FRAME_BUFFER_SIZE - LENGTH_HEADER_SIZE;

/// Length-delimited codec carrying opaque byte payloads.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Payload length of the frame whose header has already been consumed.
    pending_len: Option<usize>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes a payload into a frame.
    pub fn encode_payload(payload: &[u8]) -> Result<BytesMut, ProtocolError> {
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(ProtocolError::OversizedPayload {
                size: payload.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }

        let mut buf = BytesMut::with_capacity(LENGTH_HEADER_SIZE + payload.len());
        buf.put_u16(payload.len() as u16);
        buf.put_slice(payload);
        Ok(buf)
    }

    /// Returns whether a header has been parsed and the codec is waiting for its body.
    pub fn is_mid_frame(&self) -> bool {
        self.pending_len.is_some()
    }
}

impl Codec for FrameCodec {
    type Item = Bytes;

    fn encode(&self, item: &Bytes) -> Result<BytesMut, ProtocolError> {
        Self::encode_payload(item)
    }

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        let len = match self.pending_len {
            Some(len) => len,
            None => {
                if buf.len() < LENGTH_HEADER_SIZE {
                    return Ok(None);
                }
                let len = buf.get_u16() as usize;
                self.pending_len = Some(len);
                len
            }
        };

        if buf.len() < len {
            return Ok(None);
        }

        let payload = buf.split_to(len).freeze();
        self.pending_len = None;
        Ok(Some(payload))
    }
}
