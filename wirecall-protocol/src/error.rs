//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur during framing or envelope handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload too large: {size} bytes (max {max})")]
    OversizedPayload { size: usize, max: usize },

    #[error("type name too long: {len} bytes (max {max})")]
    TypeNameTooLong { len: usize, max: usize },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("marshal error: {0}")]
    Marshal(#[from] MarshalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a `Marshal` implementation.
#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("no type registered under name '{0}'")]
    UnknownTypeName(String),

    #[error("value type is not registered")]
    UnregisteredType,

    #[error("registered decoder for '{0}' produced a different type")]
    TypeMismatch(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::OversizedPayload {
            size: 65534,
            max: 65533,
        };
        let msg = err.to_string();
        assert!(msg.contains("65534"));
        assert!(msg.contains("65533"));

        let err = ProtocolError::TypeNameTooLong { len: 300, max: 255 };
        assert!(err.to_string().contains("300"));

        let err = ProtocolError::MalformedFrame("unknown kind 0x09".to_string());
        assert!(err.to_string().contains("0x09"));
    }

    #[test]
    fn test_marshal_error_conversion() {
        let err: ProtocolError = MarshalError::UnknownTypeName("demo.Missing".into()).into();
        assert!(matches!(err, ProtocolError::Marshal(_)));
        assert!(err.to_string().contains("demo.Missing"));
    }
}
