//! Error types for the process module.

/// Errors produced while running an external command.
///
/// A non-zero exit status is not an error at this layer; it is reported in
/// [`CommandOutcome`](super::CommandOutcome) and judged by the caller.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("command timed out after {timeout_secs}s and was killed: {command}")]
    CommandTimedOut { command: String, timeout_secs: u64 },

    #[error("failed to spawn command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Whether this error is the runner's timeout kind.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::CommandTimedOut { .. })
    }
}

/// Result type for process operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;
