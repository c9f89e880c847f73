//! Dispatcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Queue, batching and delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Endpoint each batch is POSTed to.
    pub endpoint: String,

    /// Events held before new submissions are dropped.
    pub queue_capacity: usize,

    /// Maximum events per batch.
    pub batch_size: usize,

    /// Longest a queued event waits before its batch is sent (milliseconds).
    pub flush_interval_ms: u64,

    /// Timeout for one delivery request (milliseconds).
    pub request_timeout_ms: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/events".to_string(),
            queue_capacity: 50_000,
            batch_size: 200,
            flush_interval_ms: 2_000,
            request_timeout_ms: 5_000,
        }
    }
}

impl DispatcherSettings {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Queue capacity, at least 1.
    pub fn capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Batch size, at least 1.
    pub fn batch(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Flush interval, at least 1ms.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
