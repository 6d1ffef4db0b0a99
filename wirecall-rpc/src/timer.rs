//! One-shot timers for call deadlines.

use std::fmt;
use std::time::Duration;
use tokio::runtime::Handle;

/// Arms one-shot callbacks.
pub trait Timer: Send + Sync + 'static {
    /// Runs `callback` once after `after` unless the returned handle is canceled first.
    fn arm(&self, after: Duration, callback: Box<dyn FnOnce() + Send>) -> TimerHandle;
}

/// Cancels an armed timer. Dropping the handle leaves the timer armed.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl TimerHandle {
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle whose cancel does nothing.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Cancels the timer. A timer that already fired is unaffected.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelable", &self.cancel.is_some())
            .finish()
    }
}

/// Timer backed by Tokio sleep tasks.
#[derive(Debug, Clone)]
pub struct TokioTimer {
    handle: Handle,
}

impl TokioTimer {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Default for TokioTimer {
    /// Uses the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    fn default() -> Self {
        Self::new(Handle::current())
    }
}

impl Timer for TokioTimer {
    fn arm(&self, after: Duration, callback: Box<dyn FnOnce() + Send>) -> TimerHandle {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(after).await;
            callback();
        });
        let abort = task.abort_handle();
        TimerHandle::new(move || abort.abort())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fires_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = TokioTimer::default();

        let counter = fired.clone();
        let _handle = timer.arm(
            Duration::from_millis(50),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = TokioTimer::default();

        let counter = fired.clone();
        let handle = timer.arm(
            Duration::from_millis(10),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_noop_handle() {
        TimerHandle::noop().cancel();
    }
}
