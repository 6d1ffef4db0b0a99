//! RPC error types.

use thiserror::Error;
use wirecall_session::SessionError;

/// RPC errors.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("no pending call for sequence {0}")]
    UnknownSequence(u64),

    #[error("rpc timeout")]
    Timeout,

    #[error("no completion callback supplied")]
    NilCallback,

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("sequence {0} has already been replied to")]
    DoubleReply(u64),

    /// Error text carried by a remote error response.
    #[error("remote error: {0}")]
    Remote(String),

    #[error("call canceled")]
    Canceled,

    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

impl RpcError {
    /// Returns whether the call may succeed if issued again.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Timeout => true,
            RpcError::Session(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(RpcError::Timeout.is_retryable());
        assert!(RpcError::Session(SessionError::SendQueueFull).is_retryable());
        assert!(!RpcError::Session(SessionError::SessionClosed).is_retryable());
        assert!(!RpcError::UnknownMethod("foo".into()).is_retryable());
        assert!(!RpcError::Remote("boom".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            RpcError::UnknownSequence(7).to_string(),
            "no pending call for sequence 7"
        );
        assert_eq!(RpcError::Remote("boom".into()).to_string(), "remote error: boom");
    }
}
