//! In-memory event sink (testing only)
//!
//! `RecordingSink` keeps every batch it is handed and can be scripted to
//! fail, report duplicates, panic, or stall.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DispatchError, DispatchResult};
use crate::event::TelemetryEvent;
use crate::sink::{Delivery, EventSink};

/// Scripted reaction to one `send`.
#[derive(Debug, Clone)]
pub enum SinkReply {
    Deliver,
    Duplicate,
    Fail(u16),
    Panic,
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<TelemetryEvent>>>,
    replies: Mutex<VecDeque<SinkReply>>,
    delay: Option<Duration>,
}

impl RecordingSink {
    /// Sink that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that answers with `replies` in order, then accepts everything.
    pub fn scripted(replies: Vec<SinkReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    /// Sleep this long inside every send.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every batch received, including ones answered with a failure.
    pub fn batches(&self) -> Vec<Vec<TelemetryEvent>> {
        self.batches.lock().unwrap().clone()
    }

    /// Events received across all batches, in order.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.batches().into_iter().flatten().collect()
    }

    pub fn send_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&self, batch: &[TelemetryEvent]) -> DispatchResult<Delivery> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.batches.lock().unwrap().push(batch.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SinkReply::Deliver);
        match reply {
            SinkReply::Deliver => Ok(Delivery::Delivered),
            SinkReply::Duplicate => Ok(Delivery::Duplicate),
            SinkReply::Fail(status) => Err(DispatchError::server(status, "scripted failure")),
            SinkReply::Panic => panic!("scripted sink panic"),
        }
    }
}
