//! labrig dispatch - non-blocking telemetry forwarding
//!
//! Instrumented code inside the observed project hands events to a
//! [`Dispatcher`]; a single background consumer batches them by size and
//! time and forwards each batch to an [`EventSink`] (normally [`HttpSink`]).
//! Submission never blocks and never fails: a full queue drops the event.

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod fakes;
pub mod global;
pub mod settings;
pub mod sink;
pub mod stats;

// Re-export key types
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, DispatchResult};
pub use event::{AttributeProvenance, CallStack, CapturedAttribute, TelemetryEvent};
pub use settings::DispatcherSettings;
pub use sink::{Delivery, EventSink, HttpSink};
pub use stats::{DispatchStats, StatsSnapshot};
