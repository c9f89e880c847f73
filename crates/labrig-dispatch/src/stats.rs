//! Delivery counters for a dispatcher.
//!
//! Counters are incremented silently on the hot path. Call
//! [`DispatchStats::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Lock-free counters shared by a dispatcher's producers and consumer.
#[derive(Debug, Default)]
pub struct DispatchStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    events_delivered: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub dropped: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub events_delivered: u64,
}

impl DispatchStats {
    pub const fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            batches_sent: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
        }
    }

    pub fn inc_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "dropped", "counter incremented");
    }

    /// Record a batch the sink accepted.
    pub fn record_sent(&self, events: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.events_delivered.fetch_add(events as u64, Ordering::Relaxed);
    }

    /// Record a batch that was discarded after a failed send.
    pub fn record_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn batches_sent(&self) -> u64 {
        self.batches_sent.load(Ordering::Relaxed)
    }

    pub fn batches_failed(&self) -> u64 {
        self.batches_failed.load(Ordering::Relaxed)
    }

    pub fn events_delivered(&self) -> u64 {
        self.events_delivered.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted(),
            dropped: self.dropped(),
            batches_sent: self.batches_sent(),
            batches_failed: self.batches_failed(),
            events_delivered: self.events_delivered(),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "dispatch",
            submitted = s.submitted,
            dropped = s.dropped,
            batches_sent = s.batches_sent,
            batches_failed = s.batches_failed,
            events_delivered = s.events_delivered,
        );
    }
}
