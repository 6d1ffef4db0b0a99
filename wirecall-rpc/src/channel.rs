//! Outbound side of an RPC conversation.

use crate::error::RpcError;
use wirecall_protocol::{Envelope, Request, Response};
use wirecall_session::Session;

/// Something requests and responses can be sent through.
///
/// Sends must not block; a session rejects with `SendQueueFull` instead.
pub trait RpcChannel<V>: Send + Sync {
    fn send_request(&self, request: Request<V>) -> Result<(), RpcError>;

    fn send_response(&self, response: Response<V>) -> Result<(), RpcError>;
}

impl<V: Send + 'static> RpcChannel<V> for Session<Envelope<V>> {
    fn send_request(&self, request: Request<V>) -> Result<(), RpcError> {
        self.send(&Envelope::Request(request))?;
        Ok(())
    }

    fn send_response(&self, response: Response<V>) -> Result<(), RpcError> {
        self.send(&Envelope::Response(response))?;
        Ok(())
    }
}
