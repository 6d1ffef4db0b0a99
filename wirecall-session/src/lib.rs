//! # wirecall-session
//!
//! Connection sessions for wirecall.
//!
//! This crate provides:
//! - A transport seam over any async byte stream (TCP, Unix sockets, in-memory pipes)
//! - `Session`, which decodes inbound frames on a read worker and drains a
//!   bounded outbound queue on a write worker
//! - Deterministic close semantics with a single close callback
//! - Session configuration (timeouts, queue capacity, buffer size)

pub mod config;
pub mod error;
pub mod session;
pub mod transport;

pub use config::SessionConfig;
pub use error::SessionError;
pub use session::{
    CloseCallback, MessageCallback, Session, SessionState, DEFAULT_READ_BUFFER_SIZE,
    DEFAULT_SEND_QUEUE_CAPACITY,
};
pub use transport::Transport;
