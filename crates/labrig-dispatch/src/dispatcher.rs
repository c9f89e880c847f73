//! The dispatcher: a bounded queue drained by one batching consumer.
//!
//! Producers call [`Dispatcher::submit`] from any thread; it never waits.
//! The consumer waits up to the flush interval for a first event, then keeps
//! receiving until the batch is full or one flush interval has passed since
//! that first event, and sends the batch. A failed or panicking send is
//! logged and the batch discarded.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::event::TelemetryEvent;
use crate::settings::DispatcherSettings;
use crate::sink::{Delivery, EventSink};
use crate::stats::{DispatchStats, StatsSnapshot};

/// Cloneable handle to one running consumer.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<TelemetryEvent>,
    stats: Arc<DispatchStats>,
    control: Arc<Mutex<Option<Control>>>,
}

struct Control {
    stop: oneshot::Sender<()>,
    consumer: JoinHandle<()>,
}

impl Dispatcher {
    /// Spawn the consumer on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start(settings: DispatcherSettings, sink: Arc<dyn EventSink>) -> Self {
        Self::start_on(&Handle::current(), settings, sink)
    }

    /// Spawn the consumer on `runtime`.
    pub fn start_on(runtime: &Handle, settings: DispatcherSettings, sink: Arc<dyn EventSink>) -> Self {
        let (tx, rx) = mpsc::channel(settings.capacity());
        let (stop_tx, stop_rx) = oneshot::channel();
        let stats = Arc::new(DispatchStats::new());

        let consumer = Consumer {
            rx,
            sink,
            stats: stats.clone(),
            settings,
        };
        let consumer = runtime.spawn(consumer.run(stop_rx));

        Self {
            tx,
            stats,
            control: Arc::new(Mutex::new(Some(Control {
                stop: stop_tx,
                consumer,
            }))),
        }
    }

    /// Queue an event without waiting. Returns whether it was accepted;
    /// a full or closed queue drops it.
    pub fn submit(&self, event: TelemetryEvent) -> bool {
        self.stats.inc_submitted();
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.stats.inc_dropped();
                false
            }
        }
    }

    /// Events currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the consumer after one final drain of everything queued.
    ///
    /// Best effort: the final sends can fail like any other. Later calls
    /// are no-ops, and later submissions are dropped.
    pub async fn shutdown(&self) {
        let control = match self.control.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(control) = control else {
            return;
        };

        // The consumer may already be gone if every sender was dropped.
        let _ = control.stop.send(());
        if let Err(e) = control.consumer.await {
            warn!(error = %e, "dispatcher consumer ended abnormally");
        }
        self.stats.flush();
    }
}

struct Consumer {
    rx: mpsc::Receiver<TelemetryEvent>,
    sink: Arc<dyn EventSink>,
    stats: Arc<DispatchStats>,
    settings: DispatcherSettings,
}

impl Consumer {
    async fn run(mut self, mut stop: oneshot::Receiver<()>) {
        let batch_size = self.settings.batch();
        let interval = self.settings.flush_interval();
        let mut batch = Vec::with_capacity(batch_size);
        debug!(batch_size, flush_interval_ms = interval.as_millis() as u64, "dispatcher consumer started");

        let mut stopped = false;
        while !stopped {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                first = tokio::time::timeout(interval, self.rx.recv()) => match first {
                    // Interval elapsed with nothing pending.
                    Err(_) => continue,
                    Ok(None) => break,
                    Ok(Some(event)) => {
                        let deadline = Instant::now() + interval;
                        batch.push(event);
                        stopped = self.fill_until(&mut batch, batch_size, deadline, &mut stop).await;
                        self.deliver(&mut batch).await;
                    }
                },
            }
        }

        self.rx.close();
        loop {
            self.fill(&mut batch, batch_size);
            if batch.is_empty() {
                break;
            }
            self.deliver(&mut batch).await;
        }
        info!("dispatcher consumer stopped");
    }

    /// Receive into `batch` until it is full or `deadline` passes.
    ///
    /// Returns `true` when a stop was requested meanwhile; `stop` must not
    /// be polled again after that.
    async fn fill_until(
        &mut self,
        batch: &mut Vec<TelemetryEvent>,
        batch_size: usize,
        deadline: Instant,
        stop: &mut oneshot::Receiver<()>,
    ) -> bool {
        while batch.len() < batch_size {
            tokio::select! {
                biased;
                _ = &mut *stop => return true,
                next = tokio::time::timeout_at(deadline, self.rx.recv()) => match next {
                    Ok(Some(event)) => batch.push(event),
                    Ok(None) | Err(_) => break,
                },
            }
        }
        false
    }

    /// Move already-queued events into `batch` until it is full.
    fn fill(&mut self, batch: &mut Vec<TelemetryEvent>, batch_size: usize) {
        while batch.len() < batch_size {
            match self.rx.try_recv() {
                Ok(event) => batch.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    /// Send `batch` once and clear it whatever the outcome.
    async fn deliver(&self, batch: &mut Vec<TelemetryEvent>) {
        let events = batch.len();
        let sent = AssertUnwindSafe(self.sink.send(&batch[..])).catch_unwind().await;
        match sent {
            Ok(Ok(Delivery::Delivered)) => {
                self.stats.record_sent(events);
                debug!(events, "batch delivered");
            }
            Ok(Ok(Delivery::Duplicate)) => {
                self.stats.record_sent(events);
                debug!(events, "batch already known to sink");
            }
            Ok(Err(e)) => {
                self.stats.record_failed();
                warn!(events, error = %e, "batch delivery failed, batch dropped");
            }
            Err(_) => {
                self.stats.record_failed();
                warn!(events, "event sink panicked, batch dropped");
            }
        }
        batch.clear();
    }
}
