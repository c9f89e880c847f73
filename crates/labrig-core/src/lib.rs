//! labrig core library
//!
//! The parts of an experiment run that touch the outside world:
//! - [`process`] - shell commands under a hard timeout with streamed output
//! - [`service`] - data-store and backend supervisors, and the preparer composing them
//! - [`config`]  - settings consumed by the supervisors
//! - [`obs`] / [`logging`] - structured lifecycle events and subscriber setup

pub mod config;
pub mod fakes;
pub mod logging;
pub mod obs;
pub mod process;
pub mod service;

pub use config::{render_template, shell_quote, BackendSettings, DataStoreSettings};
pub use logging::init_tracing;
pub use obs::{
    emit_module_finished, emit_module_started, emit_service_transition, emit_stage_error,
    emit_stage_finished, emit_stage_started, run_span,
};
pub use process::{CommandExecutor, CommandOutcome, ProcessError, ProcessResult, ProcessRunner};
pub use service::{
    BackendProbe, BackendStart, BackendStop, BackendSupervisor, DataStoreSupervisor,
    DatabasePreparer, LivenessProbe, ReadinessMarker, ServiceError, ServiceResult, ServiceState,
};

/// labrig version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
