//! Session error types.

use std::time::Duration;
use thiserror::Error;
use wirecall_protocol::ProtocolError;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no message callback supplied")]
    NoMessageCallback,

    #[error("session already started")]
    AlreadyStarted,

    #[error("session not started")]
    NotStarted,

    #[error("session closed")]
    SessionClosed,

    #[error("send queue full")]
    SendQueueFull,

    #[error("refusing to send an empty message")]
    EmptyMessage,

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Returns whether the caller may retry the same operation later.
    ///
    /// Only a full send queue qualifies: it clears once the writer catches up.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::SendQueueFull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(SessionError::SendQueueFull.is_retryable());
        assert!(!SessionError::SessionClosed.is_retryable());
        assert!(!SessionError::NotStarted.is_retryable());
        assert!(!SessionError::ConnectionClosed.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = SessionError::ReadTimeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));

        let err: SessionError = ProtocolError::OversizedPayload { size: 10, max: 5 }.into();
        assert!(err.to_string().starts_with("protocol error"));
    }
}
