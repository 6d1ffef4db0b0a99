//! Session configuration.

use crate::session::{DEFAULT_READ_BUFFER_SIZE, DEFAULT_SEND_QUEUE_CAPACITY};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-session tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Read deadline in milliseconds (0 = no deadline).
    pub read_timeout_ms: u64,
    /// Write deadline in milliseconds (0 = no deadline).
    pub write_timeout_ms: u64,
    /// Outbound frames that may be queued before sends are rejected.
    pub send_queue_capacity: usize,
    /// Bytes requested from the transport per read.
    pub read_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl SessionConfig {
    /// Applies `WIRECALL_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(ms) = std::env::var("WIRECALL_READ_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                self.read_timeout_ms = ms;
            }
        }

        if let Ok(ms) = std::env::var("WIRECALL_WRITE_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                self.write_timeout_ms = ms;
            }
        }

        if let Ok(cap) = std::env::var("WIRECALL_SEND_QUEUE") {
            if let Ok(n) = cap.parse() {
                self.send_queue_capacity = n;
            }
        }

        if let Ok(size) = std::env::var("WIRECALL_READ_BUFFER") {
            if let Ok(n) = size.parse() {
                self.read_buffer_size = n;
            }
        }
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }
}
