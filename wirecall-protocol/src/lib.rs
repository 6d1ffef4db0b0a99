//! # wirecall-protocol
//!
//! Wire protocol implementation for wirecall.
//!
//! This crate provides:
//! - Binary framing with a 2-byte big-endian length prefix
//! - RPC envelopes carrying a sequence number, a message kind and a payload type name
//! - Request/Response/Envelope types
//! - The `Codec` and `Marshal` seams, plus a JSON-backed type registry

pub mod codec;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod marshal;
pub mod message;

pub use codec::Codec;
pub use envelope::{EnvelopeCodec, ENVELOPE_HEADER_SIZE, MAX_ENVELOPE_BODY, MAX_TYPE_NAME_LEN};
pub use error::{MarshalError, ProtocolError};
pub use frame::{FrameCodec, FRAME_BUFFER_SIZE, LENGTH_HEADER_SIZE, MAX_FRAME_PAYLOAD};
pub use marshal::{JsonRegistry, Marshal, Payload};
pub use message::{Envelope, MessageKind, Request, Response};
