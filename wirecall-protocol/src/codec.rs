//! The codec seam shared by the framing and envelope codecs.

use crate::error::ProtocolError;
use bytes::BytesMut;

/// Turns messages into wire bytes and a byte stream back into messages.
///
/// Encoding is stateless per message. Decoding is stateful per connection: the
/// reader owns the receive buffer, appends whatever the transport produced and
/// calls [`Codec::decode`] until it returns `Ok(None)`, which means "read more".
/// Header state parsed on an earlier call is kept in the codec, so a frame may
/// arrive in arbitrarily small pieces.
pub trait Codec: Send + 'static {
    /// The message type produced and consumed by this codec.
    type Item: Send + 'static;

    /// Encodes one message into a complete frame.
    fn encode(&self, item: &Self::Item) -> Result<BytesMut, ProtocolError>;

    /// Attempts to decode the next message from `buf`.
    ///
    /// Returns `Ok(Some(item))` once a full message has been consumed,
    /// `Ok(None)` if more data is needed, or `Err` on malformed input.
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, ProtocolError>;
}
