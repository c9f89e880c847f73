//! Error types for service supervision.

use crate::process::ProcessError;

/// Errors produced while driving an external service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A required configuration key is absent or blank.
    #[error("missing required configuration key: {key}")]
    MissingConfigKey { key: String },

    /// The port is held by something that is not the expected service.
    #[error("port {port} on {host} is already in use by another process")]
    PortAlreadyInUse { host: String, port: u16 },

    /// The service never reported ready within its retry budget.
    #[error("{service} did not become ready after {attempts} attempt(s)")]
    NotReady { service: String, attempts: u32 },

    /// The service reported a terminal failure status.
    #[error("{service} failed to start: {status}")]
    LaunchFailed { service: String, status: String },

    /// The port is still held after stop was requested.
    #[error("server on port {port} was not stopped: {reason}")]
    ServerNotStopped { port: u16, reason: String },

    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn missing(key: impl Into<String>) -> Self {
        ServiceError::MissingConfigKey { key: key.into() }
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = ServiceError::missing("backend.port");
        assert!(err.to_string().contains("backend.port"));

        let err = ServiceError::PortAlreadyInUse {
            host: "127.0.0.1".to_string(),
            port: 8080,
        };
        assert!(err.to_string().contains("8080"));

        let err = ServiceError::NotReady {
            service: "postgresql".to_string(),
            attempts: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("postgresql"));
        assert!(msg.contains('5'));
    }

    #[test]
    fn test_process_error_converts() {
        let err: ServiceError = ProcessError::CommandTimedOut {
            command: "service mysql start".to_string(),
            timeout_secs: 60,
        }
        .into();
        assert!(matches!(err, ServiceError::Process(_)));
        assert!(err.to_string().contains("service mysql start"));
    }
}
