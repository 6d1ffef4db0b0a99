//! RPC envelope types.

/// Message kind carried in the envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Request = 0x01,
    ResponseOk = 0x02,
    ResponseErr = 0x04,
}

impl MessageKind {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(MessageKind::Request),
            0x02 => Some(MessageKind::ResponseOk),
            0x04 => Some(MessageKind::ResponseErr),
            _ => None,
        }
    }
}

/// A remote call.
///
/// `method` is not a separate field on the wire: the envelope's type-name slot
/// carries the payload type name, and decoded requests report it as the method.
#[derive(Debug, Clone, PartialEq)]
pub struct Request<V> {
    /// Sequence number assigned by the calling client.
    pub sequence: u64,
    /// Remote operation name.
    pub method: String,
    /// Domain payload.
    pub data: V,
}

impl<V> Request<V> {
    pub fn new(sequence: u64, method: impl Into<String>, data: V) -> Self {
        Self {
            sequence,
            method: method.into(),
            data,
        }
    }
}

/// The reply to a [`Request`], carrying the same sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<V> {
    pub sequence: u64,
    /// Reply payload, or the remote error text.
    pub result: Result<V, String>,
}

impl<V> Response<V> {
    pub fn ok(sequence: u64, data: V) -> Self {
        Self {
            sequence,
            result: Ok(data),
        }
    }

    pub fn error(sequence: u64, message: impl Into<String>) -> Self {
        Self {
            sequence,
            result: Err(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn is_error(&self) -> bool {
        self.result.is_err()
    }

    pub fn kind(&self) -> MessageKind {
        if self.is_ok() {
            MessageKind::ResponseOk
        } else {
            MessageKind::ResponseErr
        }
    }
}

/// Everything that travels through an RPC session.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<V> {
    Request(Request<V>),
    Response(Response<V>),
}

impl<V> Envelope<V> {
    pub fn sequence(&self) -> u64 {
        match self {
            Envelope::Request(request) => request.sequence,
            Envelope::Response(response) => response.sequence,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Envelope::Request(_) => MessageKind::Request,
            Envelope::Response(response) => response.kind(),
        }
    }
}

impl<V> From<Request<V>> for Envelope<V> {
    fn from(request: Request<V>) -> Self {
        Envelope::Request(request)
    }
}

impl<V> From<Response<V>> for Envelope<V> {
    fn from(response: Response<V>) -> Self {
        Envelope::Response(response)
    }
}
