//! Session management.
//!
//! A session owns one transport. Once started it runs two tasks:
//!
//! - the read worker pulls bytes from the transport, decodes them with the
//!   session codec and hands every message to the message callback;
//! - the write worker drains the bounded outbound queue into the transport.
//!
//! `close` stops new sends by closing the queue. The write worker flushes what
//! was already queued, shuts the transport down and fires the close callback.

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;
use wirecall_protocol::Codec;

/// Default outbound queue capacity (frames).
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 1024;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Receives decoded messages, or the error that stopped the read worker.
pub type MessageCallback<M> = Arc<dyn Fn(Result<M, SessionError>) + Send + Sync>;

/// Receives the close reason once the transport has been shut down.
pub type CloseCallback = Arc<dyn Fn(&str) + Send + Sync>;

type BoxedTransport = Box<dyn Transport>;

type UserData = Arc<dyn Any + Send + Sync>;

/// Session lifecycle. Transitions only go forward: Idle -> Started -> Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, workers not running yet.
    Idle,
    /// Workers running.
    Started,
    /// Closed; terminal.
    Closed,
}

/// A framed connection.
///
/// `Session` is a cheap handle; clones share the same connection, so a message
/// callback may keep one to reply or to close. The connection is torn down once
/// it is closed or every handle has been dropped.
pub struct Session<M> {
    inner: Arc<Inner<M>>,
}

impl<M> Clone for Session<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<M> {
    id: String,
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
    read_buffer_size: usize,
    send_queue_capacity: usize,
    codec: Mutex<Box<dyn Codec<Item = M>>>,
    shared: Mutex<Shared<M>>,
    /// Flipped to `true` on close so the read worker stops waiting on the peer.
    closed: watch::Sender<bool>,
}

/// Mutable session state, guarded by a single lock.
struct Shared<M> {
    state: SessionState,
    transport: Option<BoxedTransport>,
    outbound_tx: Option<mpsc::Sender<Bytes>>,
    outbound_rx: Option<mpsc::Receiver<Bytes>>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    message_callback: Option<MessageCallback<M>>,
    close_callback: Option<CloseCallback>,
    close_reason: Option<String>,
    user_data: Option<UserData>,
}

impl<M: Send + 'static> Session<M> {
    /// Creates an idle session with default settings.
    pub fn new<T, C>(transport: T, codec: C) -> Self
    where
        T: Transport,
        C: Codec<Item = M>,
    {
        Self::with_config(transport, codec, &SessionConfig::default())
    }

    /// Creates an idle session using the given configuration.
    pub fn with_config<T, C>(transport: T, codec: C, config: &SessionConfig) -> Self
    where
        T: Transport,
        C: Codec<Item = M>,
    {
        let send_queue_capacity = config.send_queue_capacity.max(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(send_queue_capacity);
        let (closed, _) = watch::channel(false);

        let inner = Inner {
            id: Uuid::new_v4().to_string(),
            local_addr: transport.local_addr(),
            remote_addr: transport.remote_addr(),
            read_buffer_size: config.read_buffer_size.max(1),
            send_queue_capacity,
            codec: Mutex::new(Box::new(codec)),
            shared: Mutex::new(Shared {
                state: SessionState::Idle,
                transport: Some(Box::new(transport)),
                outbound_tx: Some(outbound_tx),
                outbound_rx: Some(outbound_rx),
                read_timeout: config.read_timeout(),
                write_timeout: config.write_timeout(),
                message_callback: None,
                close_callback: None,
                close_reason: None,
                user_data: None,
            }),
            closed,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Unique session ID.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    pub fn state(&self) -> SessionState {
        self.inner.shared.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Reason recorded by the first `close` call.
    pub fn close_reason(&self) -> Option<String> {
        self.inner.shared.lock().close_reason.clone()
    }

    /// Outbound queue capacity in frames.
    pub fn send_queue_capacity(&self) -> usize {
        self.inner.send_queue_capacity
    }

    /// Sets read and write deadlines. `None` disables a deadline.
    ///
    /// The read deadline is applied to every transport read, the write
    /// deadline to every queued frame.
    pub fn set_timeout(&self, read: Option<Duration>, write: Option<Duration>) {
        let mut shared = self.inner.shared.lock();
        shared.read_timeout = read;
        shared.write_timeout = write;
    }

    pub fn set_close_callback<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.shared.lock().close_callback = Some(Arc::new(callback));
    }

    /// Attaches an application value to the session, replacing any previous one.
    pub fn set_user_data<T>(&self, data: T)
    where
        T: Any + Send + Sync,
    {
        self.inner.shared.lock().user_data = Some(Arc::new(data));
    }

    /// Returns the attached value if one is set and it is a `T`.
    pub fn user_data<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let data = self.inner.shared.lock().user_data.clone()?;
        data.downcast::<T>().ok()
    }

    /// Replaces the codec. Partially decoded input held by the old codec is lost.
    pub fn set_codec<C>(&self, codec: C)
    where
        C: Codec<Item = M>,
    {
        *self.inner.codec.lock() = Box::new(codec);
    }

    /// Starts the read and write workers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, callback: Option<MessageCallback<M>>) -> Result<(), SessionError> {
        let callback = callback.ok_or(SessionError::NoMessageCallback)?;

        let (transport, outbound_rx) = {
            let mut shared = self.inner.shared.lock();
            match shared.state {
                SessionState::Started => return Err(SessionError::AlreadyStarted),
                SessionState::Closed => return Err(SessionError::SessionClosed),
                SessionState::Idle => {}
            }
            let transport = shared
                .transport
                .take()
                .ok_or(SessionError::SessionClosed)?;
            let outbound_rx = shared
                .outbound_rx
                .take()
                .ok_or(SessionError::SessionClosed)?;
            shared.state = SessionState::Started;
            shared.message_callback = Some(callback);
            (transport, outbound_rx)
        };

        tracing::debug!(
            "[{}] Session started (remote: {:?})",
            self.inner.id,
            self.inner.remote_addr
        );

        let (reader, writer) = tokio::io::split(transport);
        let closed = self.inner.closed.subscribe();
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(read_loop(
            weak.clone(),
            self.inner.id.clone(),
            reader,
            closed,
            self.inner.read_buffer_size,
        ));
        tokio::spawn(write_loop(weak, self.inner.id.clone(), writer, outbound_rx));

        Ok(())
    }

    /// Starts the session with a closure as message callback.
    pub fn start_with<F>(&self, callback: F) -> Result<(), SessionError>
    where
        F: Fn(Result<M, SessionError>) + Send + Sync + 'static,
    {
        self.start(Some(Arc::new(callback)))
    }

    /// Encodes a message and queues it for the write worker. Never blocks.
    pub fn send(&self, message: &M) -> Result<(), SessionError> {
        self.ensure_started()?;
        let encoded = self.inner.codec.lock().encode(message)?;
        self.enqueue(encoded.freeze())
    }

    /// Queues raw, already framed bytes. Never blocks.
    pub fn send_bytes(&self, bytes: impl Into<Bytes>) -> Result<(), SessionError> {
        self.ensure_started()?;
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        self.enqueue(bytes)
    }

    /// Closes the session. Only the first call has any effect.
    ///
    /// Frames queued before the call are still written; the close callback
    /// runs after the transport has been shut down.
    pub fn close(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let idle_transport = {
            let mut shared = self.inner.shared.lock();
            let previous = shared.state;
            if previous == SessionState::Closed {
                return;
            }
            shared.state = SessionState::Closed;
            shared.close_reason = Some(reason.clone());
            // Dropping the sender lets the write worker drain and exit.
            shared.outbound_tx = None;
            shared.outbound_rx = None;
            match previous {
                SessionState::Idle => Some(shared.transport.take()),
                _ => None,
            }
        };

        tracing::debug!("[{}] Closing session: {}", self.inner.id, reason);
        self.inner.closed.send_replace(true);

        // No worker exists for an idle session, so tear it down here.
        if let Some(transport) = idle_transport {
            drop(transport);
            self.inner.finish();
        }
    }

    fn ensure_started(&self) -> Result<(), SessionError> {
        match self.inner.shared.lock().state {
            SessionState::Idle => Err(SessionError::NotStarted),
            SessionState::Closed => Err(SessionError::SessionClosed),
            SessionState::Started => Ok(()),
        }
    }

    fn enqueue(&self, bytes: Bytes) -> Result<(), SessionError> {
        let shared = self.inner.shared.lock();
        match shared.state {
            SessionState::Idle => return Err(SessionError::NotStarted),
            SessionState::Closed => return Err(SessionError::SessionClosed),
            SessionState::Started => {}
        }
        let tx = shared
            .outbound_tx
            .as_ref()
            .ok_or(SessionError::SessionClosed)?;
        tx.try_send(bytes).map_err(|e| match e {
            TrySendError::Full(_) => {
                tracing::debug!("[{}] Send queue full", self.inner.id);
                SessionError::SendQueueFull
            }
            TrySendError::Closed(_) => SessionError::SessionClosed,
        })
    }
}

impl<M> fmt::Debug for Session<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.inner.shared.lock().state)
            .field("remote_addr", &self.inner.remote_addr)
            .finish()
    }
}

impl<M> Inner<M> {
    fn is_closed(&self) -> bool {
        self.shared.lock().state == SessionState::Closed
    }

    /// Invokes the message callback without holding the state lock.
    fn deliver(&self, result: Result<M, SessionError>) {
        let callback = self.shared.lock().message_callback.clone();
        if let Some(callback) = callback {
            callback(result);
        }
    }

    /// Terminal step: releases both callbacks and runs the close callback once.
    fn finish(&self) {
        let (callback, reason) = {
            let mut shared = self.shared.lock();
            shared.message_callback = None;
            (
                shared.close_callback.take(),
                shared.close_reason.clone().unwrap_or_default(),
            )
        };

        tracing::info!("[{}] Session closed: {}", self.id, reason);
        if let Some(callback) = callback {
            callback(&reason);
        }
    }
}

async fn read_loop<M: Send + 'static>(
    inner: Weak<Inner<M>>,
    id: String,
    mut reader: ReadHalf<BoxedTransport>,
    mut closed: watch::Receiver<bool>,
    buffer_size: usize,
) {
    let mut buf = BytesMut::with_capacity(buffer_size);

    loop {
        // Hand out everything already buffered before reading again.
        let read_timeout = {
            let Some(session) = inner.upgrade() else {
                return;
            };
            loop {
                if session.is_closed() {
                    tracing::debug!("[{}] Read worker exiting: session closed", id);
                    return;
                }
                let decoded = session.codec.lock().decode(&mut buf);
                match decoded {
                    Ok(Some(message)) => session.deliver(Ok(message)),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!("[{}] Decode error: {}", id, e);
                        session.deliver(Err(e.into()));
                        return;
                    }
                }
            }
            let timeout = session.shared.lock().read_timeout;
            timeout
        };

        buf.reserve(buffer_size);
        let result = tokio::select! {
            result = read_some(&mut reader, &mut buf, read_timeout) => result,
            _ = closed.changed() => {
                tracing::debug!("[{}] Read worker exiting: session closed", id);
                return;
            }
        };

        let Some(session) = inner.upgrade() else {
            return;
        };
        if session.is_closed() {
            return;
        }
        match result {
            Ok(0) => {
                tracing::debug!("[{}] Connection closed by peer", id);
                session.deliver(Err(SessionError::ConnectionClosed));
                return;
            }
            Ok(n) => {
                tracing::debug!("[{}] Received {} bytes", id, n);
            }
            Err(e) => {
                tracing::debug!("[{}] Read error: {}", id, e);
                session.deliver(Err(e));
                return;
            }
        }
    }
}

async fn read_some(
    reader: &mut ReadHalf<BoxedTransport>,
    buf: &mut BytesMut,
    timeout: Option<Duration>,
) -> Result<usize, SessionError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, reader.read_buf(buf))
            .await
            .map_err(|_| SessionError::ReadTimeout(limit))?
            .map_err(SessionError::Io),
        None => reader.read_buf(buf).await.map_err(SessionError::Io),
    }
}

async fn write_loop<M: Send + 'static>(
    inner: Weak<Inner<M>>,
    id: String,
    mut writer: WriteHalf<BoxedTransport>,
    mut outbound: mpsc::Receiver<Bytes>,
) {
    // `recv` yields `None` only once the queue is closed and drained.
    while let Some(bytes) = outbound.recv().await {
        let write_timeout = inner
            .upgrade()
            .and_then(|session| session.shared.lock().write_timeout);

        if let Err(e) = write_frame(&mut writer, &bytes, write_timeout).await {
            tracing::debug!("[{}] Write error: {}", id, e);
            if let Some(session) = inner.upgrade() {
                session.deliver(Err(e));
            }
            continue;
        }
        tracing::debug!("[{}] Wrote {} bytes", id, bytes.len());
    }

    if let Err(e) = writer.shutdown().await {
        tracing::debug!("[{}] Transport shutdown error: {}", id, e);
    }
    drop(writer);

    if let Some(session) = inner.upgrade() {
        session.finish();
    }
}

async fn write_frame(
    writer: &mut WriteHalf<BoxedTransport>,
    bytes: &[u8],
    timeout: Option<Duration>,
) -> Result<(), SessionError> {
    let write = async {
        writer.write_all(bytes).await?;
        writer.flush().await
    };
    match timeout {
        Some(limit) => tokio::time::timeout(limit, write)
            .await
            .map_err(|_| SessionError::WriteTimeout(limit))?
            .map_err(SessionError::Io),
        None => write.await.map_err(SessionError::Io),
    }
}
