//! Error types for pipeline execution.

use labrig_core::process::ProcessError;
use labrig_core::service::ServiceError;

use crate::module::Phase;

/// Errors produced while building or running a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A stage spec named a kind no stage is registered for.
    #[error("unknown stage kind: '{kind}'")]
    UnknownStageKind { kind: String },

    /// A stage needed a context field no earlier stage or setting provided.
    #[error("missing required context field: {field}")]
    MissingContextField { field: String },

    /// A stage's parameters could not be interpreted.
    #[error("invalid parameters for stage '{stage}': {reason}")]
    InvalidStageParams { stage: String, reason: String },

    /// A stage failed and aborted its module.
    #[error("stage '{stage}' failed in {phase} phase: {source}")]
    StageFailed {
        stage: String,
        phase: Phase,
        #[source]
        source: Box<PipelineError>,
    },

    /// A command a stage depends on exited non-zero.
    #[error("stage '{stage}' command exited with code {exit_code}: {command}")]
    CommandFailed {
        stage: String,
        command: String,
        exit_code: i32,
    },

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn missing(field: impl Into<String>) -> Self {
        PipelineError::MissingContextField {
            field: field.into(),
        }
    }

    pub fn invalid(stage: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        PipelineError::InvalidStageParams {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }

    /// The error underneath any `StageFailed` wrapping.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_unwraps_stage_failure() {
        let err = PipelineError::StageFailed {
            stage: "tests".to_string(),
            phase: Phase::Main,
            source: Box::new(PipelineError::missing("work_dir")),
        };
        assert!(matches!(err.root(), PipelineError::MissingContextField { .. }));
        assert!(err.to_string().contains("main phase"));
        assert!(err.to_string().contains("work_dir"));
    }

    #[test]
    fn test_service_error_converts() {
        let err: PipelineError = ServiceError::missing("backend.port").into();
        assert!(err.to_string().contains("backend.port"));
    }
}
