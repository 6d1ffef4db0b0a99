//! RPC client.
//!
//! Every call gets the next sequence number and an entry in the pending-call
//! table. The entry is completed by whichever comes first: the matching
//! response or the call's timer. Both paths remove the entry from the table
//! before touching the callback, so only one of them can ever invoke it.

use crate::channel::RpcChannel;
use crate::error::RpcError;
use crate::timer::{Timer, TimerHandle, TokioTimer};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use wirecall_protocol::{Request, Response};

/// Timeout used when the caller has no better value.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(8);

/// Completion callback for [`Client::async_call`]. Invoked at most once.
pub type CallCallback<V> = Box<dyn FnOnce(Result<V, RpcError>) + Send + Sync>;

struct PendingCall<V> {
    method: String,
    callback: CallCallback<V>,
    timer: Option<TimerHandle>,
}

struct ClientInner<V> {
    next_sequence: AtomicU64,
    pending: DashMap<u64, PendingCall<V>>,
    timer: Arc<dyn Timer>,
}

impl<V> ClientInner<V> {
    fn expire(&self, sequence: u64) {
        // Absent means the response won the race.
        if let Some((_, call)) = self.pending.remove(&sequence) {
            tracing::debug!("RPC {} ({}) timed out", sequence, call.method);
            (call.callback)(Err(RpcError::Timeout));
        }
    }
}

/// Issues calls and correlates responses by sequence number.
///
/// Cloning is cheap; clones share sequence numbers and pending calls.
pub struct Client<V> {
    inner: Arc<ClientInner<V>>,
}

impl<V> Clone for Client<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Send + 'static> Client<V> {
    /// Creates a client whose deadlines run on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new() -> Self {
        Self::with_timer(Arc::new(TokioTimer::default()))
    }

    /// Creates a client with a custom timer.
    pub fn with_timer(timer: Arc<dyn Timer>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                next_sequence: AtomicU64::new(0),
                pending: DashMap::new(),
                timer,
            }),
        }
    }

    /// Sends a request and registers `callback` for its completion.
    ///
    /// Returns the sequence number assigned to the call. If the request cannot
    /// be sent the error is returned here and the callback is dropped unused;
    /// otherwise the callback receives exactly one of the response or
    /// [`RpcError::Timeout`].
    pub fn async_call(
        &self,
        channel: &dyn RpcChannel<V>,
        method: impl Into<String>,
        data: V,
        timeout: Duration,
        callback: Option<CallCallback<V>>,
    ) -> Result<u64, RpcError> {
        let callback = callback.ok_or(RpcError::NilCallback)?;
        let method = method.into();
        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;

        // Registered before sending so a fast response always finds it.
        self.inner.pending.insert(
            sequence,
            PendingCall {
                method: method.clone(),
                callback,
                timer: None,
            },
        );

        tracing::debug!("Sending RPC {} ({})", sequence, method);
        if let Err(e) = channel.send_request(Request::new(sequence, method, data)) {
            self.inner.pending.remove(&sequence);
            return Err(e);
        }

        let weak = Arc::downgrade(&self.inner);
        let handle = self.inner.timer.arm(
            timeout,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.expire(sequence);
                }
            }),
        );

        match self.inner.pending.get_mut(&sequence) {
            Some(mut call) => call.timer = Some(handle),
            None => handle.cancel(),
        }

        Ok(sequence)
    }

    /// Sends a request and waits for its outcome.
    pub async fn call(
        &self,
        channel: &dyn RpcChannel<V>,
        method: impl Into<String>,
        data: V,
        timeout: Duration,
    ) -> Result<V, RpcError> {
        let (tx, rx) = oneshot::channel();
        self.async_call(
            channel,
            method,
            data,
            timeout,
            Some(Box::new(move |result| {
                let _ = tx.send(result);
            })),
        )?;

        rx.await.map_err(|_| RpcError::Canceled)?
    }

    /// Completes the pending call matching `response.sequence`.
    ///
    /// Fails with [`RpcError::UnknownSequence`] for late, duplicate or
    /// unsolicited responses; no callback is invoked in that case.
    pub fn on_rpc_response(&self, response: Response<V>) -> Result<(), RpcError> {
        let sequence = response.sequence;
        let Some((_, call)) = self.inner.pending.remove(&sequence) else {
            tracing::debug!("No pending call for response {}", sequence);
            return Err(RpcError::UnknownSequence(sequence));
        };

        if let Some(timer) = call.timer {
            timer.cancel();
        }

        tracing::debug!("RPC {} ({}) completed", sequence, call.method);
        (call.callback)(response.result.map_err(RpcError::Remote));
        Ok(())
    }

    /// Number of calls still waiting for a response or a timeout.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }
}

impl<V: Send + 'static> Default for Client<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for Client<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("pending", &self.inner.pending.len())
            .field(
                "next_sequence",
                &(self.inner.next_sequence.load(Ordering::SeqCst) + 1),
            )
            .finish()
    }
}
