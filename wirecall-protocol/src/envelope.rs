//! RPC envelope codec.
//!
//! Envelope layout (12 bytes header + body):
//!
//! ```text
//! +----------+--------+----------+----------+
//! | sequence |  kind  | name_len | body_len |
//! | 8 bytes  | 1 byte |  1 byte  | 2 bytes  |
//! +----------+--------+----------+----------+
//! | type name          | payload            |
//! | name_len bytes     | body_len bytes     |
//! +--------------------+--------------------+
//! ```
//!
//! Error responses carry `name_len = 0` and the UTF-8 error text as payload.

use crate::codec::Codec;
use crate::error::ProtocolError;
use crate::frame::FRAME_BUFFER_SIZE;
use crate::marshal::Marshal;
use crate::message::{Envelope, MessageKind, Request, Response};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::Arc;

/// Size of the fixed envelope header in bytes (8+1+1+2 = 12).
pub const ENVELOPE_HEADER_SIZE: usize = 12;

/// Maximum combined size of type name and payload (65523 bytes).
pub const MAX_ENVELOPE_BODY: usize = FRAME_BUFFER_SIZE - ENVELOPE_HEADER_SIZE;

/// Maximum type name length addressable by the 1-byte length field.
pub const MAX_TYPE_NAME_LEN: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy)]
struct EnvelopeHeader {
    sequence: u64,
    kind: u8,
    name_len: usize,
    body_len: usize,
}

/// Codec for [`Envelope`]s; payloads go through the supplied [`Marshal`].
pub struct EnvelopeCodec<M: Marshal> {
    marshal: Arc<M>,
    /// Header of the envelope whose body has not fully arrived yet.
    header: Option<EnvelopeHeader>,
}

impl<M: Marshal> EnvelopeCodec<M> {
    pub fn new(marshal: Arc<M>) -> Self {
        Self {
            marshal,
            header: None,
        }
    }

    /// Returns the registry used for payloads.
    pub fn marshal(&self) -> &Arc<M> {
        &self.marshal
    }

    /// Encodes a request envelope.
    pub fn encode_request(&self, request: &Request<M::Value>) -> Result<BytesMut, ProtocolError> {
        let (name, body) = self.marshal.marshal(&request.data)?;
        write_envelope(
            request.sequence,
            MessageKind::Request,
            name.as_bytes(),
            &body,
        )
    }

    /// Encodes a response envelope.
    pub fn encode_response(
        &self,
        response: &Response<M::Value>,
    ) -> Result<BytesMut, ProtocolError> {
        match &response.result {
            Ok(data) => {
                let (name, body) = self.marshal.marshal(data)?;
                write_envelope(
                    response.sequence,
                    MessageKind::ResponseOk,
                    name.as_bytes(),
                    &body,
                )
            }
            Err(message) => write_envelope(
                response.sequence,
                MessageKind::ResponseErr,
                &[],
                message.as_bytes(),
            ),
        }
    }

    fn build(
        &self,
        header: EnvelopeHeader,
        name: Bytes,
        body: Bytes,
    ) -> Result<Envelope<M::Value>, ProtocolError> {
        let sequence = header.sequence;
        match MessageKind::from_byte(header.kind) {
            Some(MessageKind::Request) => {
                let method = utf8(name, "type name")?;
                let data = self.marshal.unmarshal(&method, &body)?;
                Ok(Envelope::Request(Request {
                    sequence,
                    method,
                    data,
                }))
            }
            Some(MessageKind::ResponseOk) => {
                let type_name = utf8(name, "type name")?;
                let data = self.marshal.unmarshal(&type_name, &body)?;
                Ok(Envelope::Response(Response::ok(sequence, data)))
            }
            Some(MessageKind::ResponseErr) => {
                if !name.is_empty() {
                    return Err(ProtocolError::MalformedFrame(format!(
                        "error response {} carries a {}-byte type name",
                        sequence,
                        name.len()
                    )));
                }
                let message = utf8(body, "error text")?;
                Ok(Envelope::Response(Response::error(sequence, message)))
            }
            None => Err(ProtocolError::MalformedFrame(format!(
                "unknown message kind {:#04x}",
                header.kind
            ))),
        }
    }
}

impl<M: Marshal> Codec for EnvelopeCodec<M> {
    type Item = Envelope<M::Value>;

    fn encode(&self, item: &Self::Item) -> Result<BytesMut, ProtocolError> {
        match item {
            Envelope::Request(request) => self.encode_request(request),
            Envelope::Response(response) => self.encode_response(response),
        }
    }

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, ProtocolError> {
        let header = match self.header {
            Some(header) => header,
            None => {
                if buf.len() < ENVELOPE_HEADER_SIZE {
                    return Ok(None);
                }
                let header = EnvelopeHeader {
                    sequence: buf.get_u64(),
                    kind: buf.get_u8(),
                    name_len: buf.get_u8() as usize,
                    body_len: buf.get_u16() as usize,
                };
                self.header = Some(header);
                header
            }
        };

        if buf.len() < header.name_len + header.body_len {
            return Ok(None);
        }

        // The body is consumed even when it turns out to be invalid.
        self.header = None;
        let name = buf.split_to(header.name_len).freeze();
        let body = buf.split_to(header.body_len).freeze();

        self.build(header, name, body).map(Some)
    }
}

fn write_envelope(
    sequence: u64,
    kind: MessageKind,
    name: &[u8],
    body: &[u8],
) -> Result<BytesMut, ProtocolError> {
    if name.len() > MAX_TYPE_NAME_LEN {
        return Err(ProtocolError::TypeNameTooLong {
            len: name.len(),
            max: MAX_TYPE_NAME_LEN,
        });
    }

    let size = name.len() + body.len();
    if size > MAX_ENVELOPE_BODY {
        return Err(ProtocolError::OversizedPayload {
            size,
            max: MAX_ENVELOPE_BODY,
        });
    }

    let mut buf = BytesMut::with_capacity(ENVELOPE_HEADER_SIZE + size);
    buf.put_u64(sequence);
    buf.put_u8(kind.as_byte());
    buf.put_u8(name.len() as u8);
    buf.put_u16(body.len() as u16);
    buf.put_slice(name);
    buf.put_slice(body);
    Ok(buf)
}

fn utf8(bytes: Bytes, what: &str) -> Result<String, ProtocolError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ProtocolError::MalformedFrame(format!("invalid UTF-8 in {}", what)))
}
