//! Process-wide dispatcher for instrumented code that cannot be handed a handle.
//!
//! [`init`] builds the dispatcher once, on its own single-worker runtime, so
//! it works from plain synchronous code. [`submit`] before `init` is a silent
//! no-op. Call [`shutdown`] from the process-exit path for a final drain;
//! it is best effort and may not complete if the process is killed.

use std::sync::{Arc, OnceLock};
use std::thread;

use tokio::runtime::{Builder, Runtime};
use tracing::info;

use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, DispatchResult};
use crate::event::TelemetryEvent;
use crate::settings::DispatcherSettings;
use crate::sink::{EventSink, HttpSink};
use crate::stats::StatsSnapshot;

struct Global {
    dispatcher: Dispatcher,
    runtime: Runtime,
}

static GLOBAL: OnceLock<Global> = OnceLock::new();

/// Initialise the global dispatcher with an HTTP sink.
pub fn init(settings: DispatcherSettings) -> DispatchResult<()> {
    let sink = HttpSink::from_settings(&settings)?;
    init_with_sink(settings, Arc::new(sink))
}

/// Initialise the global dispatcher with any sink.
pub fn init_with_sink(settings: DispatcherSettings, sink: Arc<dyn EventSink>) -> DispatchResult<()> {
    if GLOBAL.get().is_some() {
        return Err(DispatchError::AlreadyInitialised);
    }

    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("labrig-dispatch")
        .enable_all()
        .build()?;
    let dispatcher = Dispatcher::start_on(runtime.handle(), settings, sink);

    GLOBAL
        .set(Global {
            dispatcher,
            runtime,
        })
        .map_err(|lost| {
            // Another thread won the race; drop ours without blocking.
            lost.runtime.shutdown_background();
            DispatchError::AlreadyInitialised
        })?;
    info!("global dispatcher initialised");
    Ok(())
}

pub fn is_initialised() -> bool {
    GLOBAL.get().is_some()
}

/// Queue an event on the global dispatcher. `false` when not initialised
/// or when the event was dropped.
pub fn submit(event: TelemetryEvent) -> bool {
    GLOBAL
        .get()
        .map(|g| g.dispatcher.submit(event))
        .unwrap_or(false)
}

pub fn stats() -> Option<StatsSnapshot> {
    GLOBAL.get().map(|g| g.dispatcher.stats())
}

/// Final drain-and-send of whatever is queued. Safe to call from any
/// thread, inside or outside an async runtime.
pub fn shutdown() -> DispatchResult<()> {
    let global = GLOBAL.get().ok_or(DispatchError::NotInitialised)?;
    let handle = global.runtime.handle().clone();
    let dispatcher = global.dispatcher.clone();

    // block_on is not allowed on a runtime thread, so drive it from a fresh one.
    thread::scope(|scope| {
        scope.spawn(move || handle.block_on(dispatcher.shutdown()));
    });
    Ok(())
}
