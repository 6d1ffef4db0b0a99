//! # wirecall-rpc
//!
//! Request/response correlation on top of wirecall sessions.
//!
//! This crate provides:
//! - `Client`: sequence allocation, a pending-call table and per-call timeouts
//! - `Server`: method registration and dispatch with single-use reply contexts
//! - `Endpoint`: routes inbound envelopes to the client or the server
//! - The `Timer` and `RpcChannel` seams

pub mod channel;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod server;
pub mod timer;

pub use channel::RpcChannel;
pub use client::{CallCallback, Client, DEFAULT_RPC_TIMEOUT};
pub use endpoint::Endpoint;
pub use error::RpcError;
pub use server::{Handler, ReplyContext, Server};
pub use timer::{Timer, TimerHandle, TokioTimer};
