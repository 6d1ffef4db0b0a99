//! RPC server: method registry and request dispatch.

use crate::channel::RpcChannel;
use crate::error::RpcError;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use wirecall_protocol::{Request, Response};

/// Handles one request. The handler may reply immediately or keep the
/// context and reply later from another task.
pub type Handler<V> = Arc<dyn Fn(V, ReplyContext<V>) + Send + Sync>;

/// Sends the response for one request.
///
/// Clones share the same reply slot: the first reply that is handed to the
/// channel wins and every later one fails with [`RpcError::DoubleReply`].
pub struct ReplyContext<V> {
    sequence: u64,
    channel: Arc<dyn RpcChannel<V>>,
    replied: Arc<Mutex<bool>>,
}

impl<V> Clone for ReplyContext<V> {
    fn clone(&self) -> Self {
        Self {
            sequence: self.sequence,
            channel: self.channel.clone(),
            replied: self.replied.clone(),
        }
    }
}

impl<V> ReplyContext<V> {
    pub fn new(channel: Arc<dyn RpcChannel<V>>, sequence: u64) -> Self {
        Self {
            sequence,
            channel,
            replied: Arc::new(Mutex::new(false)),
        }
    }

    /// Sequence number of the request being answered.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Sends `Ok(data)` or the error text back to the caller.
    ///
    /// A reply that fails to send does not use up the slot.
    pub fn reply(&self, result: Result<V, String>) -> Result<(), RpcError> {
        let mut replied = self.replied.lock();
        if *replied {
            tracing::warn!("Rejected second reply to request {}", self.sequence);
            return Err(RpcError::DoubleReply(self.sequence));
        }

        self.channel.send_response(Response {
            sequence: self.sequence,
            result,
        })?;
        *replied = true;
        Ok(())
    }

    pub fn reply_ok(&self, data: V) -> Result<(), RpcError> {
        self.reply(Ok(data))
    }

    pub fn reply_err(&self, message: impl Into<String>) -> Result<(), RpcError> {
        self.reply(Err(message.into()))
    }

    pub fn has_replied(&self) -> bool {
        *self.replied.lock()
    }
}

impl<V> fmt::Debug for ReplyContext<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyContext")
            .field("sequence", &self.sequence)
            .field("replied", &*self.replied.lock())
            .finish()
    }
}

/// Dispatches requests to registered handlers by method name.
pub struct Server<V> {
    handlers: RwLock<HashMap<String, Handler<V>>>,
}

impl<V: Send + 'static> Server<V> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `handler` for `method`. A later registration for the same
    /// method replaces the earlier one.
    pub fn register<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(V, ReplyContext<V>) + Send + Sync + 'static,
    {
        let method = method.into();
        tracing::debug!("Registering handler for {}", method);
        if self
            .handlers
            .write()
            .insert(method.clone(), Arc::new(handler))
            .is_some()
        {
            tracing::debug!("Replaced existing handler for {}", method);
        }
    }

    /// Removes the handler for `method`, returning whether one existed.
    pub fn unregister(&self, method: &str) -> bool {
        self.handlers.write().remove(method).is_some()
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.read().contains_key(method)
    }

    /// Invokes the handler registered for `request.method`.
    ///
    /// Unknown methods fail with [`RpcError::UnknownMethod`] and nothing is
    /// sent; notifying the peer is left to the caller.
    pub fn on_rpc_request(
        &self,
        channel: Arc<dyn RpcChannel<V>>,
        request: Request<V>,
    ) -> Result<(), RpcError> {
        let handler = self.handlers.read().get(&request.method).cloned();
        let Some(handler) = handler else {
            tracing::debug!(
                "No handler for {} (request {})",
                request.method,
                request.sequence
            );
            return Err(RpcError::UnknownMethod(request.method));
        };

        tracing::debug!("Dispatching request {} to {}", request.sequence, request.method);
        handler(request.data, ReplyContext::new(channel, request.sequence));
        Ok(())
    }
}

impl<V: Send + 'static> Default for Server<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for Server<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        let mut methods: Vec<&String> = handlers.keys().collect();
        methods.sort();
        f.debug_struct("Server").field("methods", &methods).finish()
    }
}
