//! Structured lifecycle events for pipeline runs and supervised services.
//!
//! This module provides:
//! - The run-scoped span every event of a run is recorded under
//! - Emission functions for module, stage and service lifecycle events
//!
//! Events are emitted at `info!` level; filter with `RUST_LOG`.

use tracing::info;

use crate::service::ServiceState;

/// The span all events of one run are recorded under.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("labrig.run", run_id = %run_id)
}

/// Emit event: module started.
pub fn emit_module_started(module: &str, repetitions: u32) {
    info!(event = "module.started", module = %module, repetitions = repetitions);
}

/// Emit event: module finished with duration, stage count and success status.
pub fn emit_module_finished(module: &str, duration_ms: u64, stages_run: usize, success: bool) {
    info!(
        event = "module.finished",
        module = %module,
        duration_ms = duration_ms,
        stages_run = stages_run,
        success = success,
    );
}

/// Emit event: a stage is about to execute.
pub fn emit_stage_started(stage: &str, phase: &str, iteration: u32) {
    info!(event = "stage.started", stage = %stage, phase = %phase, iteration = iteration);
}

/// Emit event: a stage finished.
pub fn emit_stage_finished(stage: &str, phase: &str, duration_ms: u64, success: bool) {
    info!(
        event = "stage.finished",
        stage = %stage,
        phase = %phase,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: a stage failed (warning level).
pub fn emit_stage_error(stage: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "stage.error", stage = %stage, error = %error);
}

/// Emit event: a supervised service moved between observed states.
pub fn emit_service_transition(service: &str, from: ServiceState, to: ServiceState) {
    info!(event = "service.transition", service = %service, from = %from, to = %to);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let span = run_span("test-run-id");
        let _entered = span.enter();
        emit_stage_started("checkout", "pre", 1);
        emit_service_transition("backend", ServiceState::Unknown, ServiceState::Active);
    }
}
