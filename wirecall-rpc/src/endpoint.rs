//! A connection end that both issues and serves calls.

use crate::channel::RpcChannel;
use crate::client::Client;
use crate::error::RpcError;
use crate::server::Server;
use std::sync::Arc;
use wirecall_protocol::Envelope;
use wirecall_session::Session;

/// Routes inbound envelopes: requests go to the server, responses to the client.
#[derive(Debug)]
pub struct Endpoint<V> {
    client: Client<V>,
    server: Server<V>,
}

impl<V: Send + 'static> Endpoint<V> {
    /// Creates an endpoint with a Tokio-timed client and an empty server.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new() -> Self {
        Self::with_parts(Client::new(), Server::new())
    }

    pub fn with_parts(client: Client<V>, server: Server<V>) -> Self {
        Self { client, server }
    }

    pub fn client(&self) -> &Client<V> {
        &self.client
    }

    pub fn server(&self) -> &Server<V> {
        &self.server
    }

    /// Hands one inbound envelope to the client or the server.
    pub fn dispatch(
        &self,
        channel: Arc<dyn RpcChannel<V>>,
        envelope: Envelope<V>,
    ) -> Result<(), RpcError> {
        match envelope {
            Envelope::Request(request) => self.server.on_rpc_request(channel, request),
            Envelope::Response(response) => self.client.on_rpc_response(response),
        }
    }

    /// Starts `session` with this endpoint as its message handler.
    ///
    /// Envelopes that cannot be dispatched are logged and dropped. The session
    /// is closed as soon as its read worker reports an error.
    pub fn attach(self: &Arc<Self>, session: &Session<Envelope<V>>) -> Result<(), RpcError> {
        let endpoint = Arc::clone(self);
        let channel = Arc::new(session.clone());

        session.start_with(move |message| match message {
            Ok(envelope) => {
                let sequence = envelope.sequence();
                let target: Arc<dyn RpcChannel<V>> = channel.clone();
                match endpoint.dispatch(target, envelope) {
                    Ok(()) => {}
                    Err(RpcError::UnknownMethod(method)) => {
                        tracing::warn!(
                            "[{}] Unknown method {} (request {})",
                            channel.id(),
                            method,
                            sequence
                        );
                    }
                    Err(e) => {
                        tracing::warn!("[{}] Dropped envelope {}: {}", channel.id(), sequence, e);
                    }
                }
            }
            Err(e) => {
                tracing::debug!("[{}] Session error: {}", channel.id(), e);
                channel.close(e.to_string());
            }
        })?;

        Ok(())
    }
}

impl<V: Send + 'static> Default for Endpoint<V> {
    fn default() -> Self {
        Self::new()
    }
}
