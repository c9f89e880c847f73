//! Error types for telemetry delivery.

/// Errors raised while delivering a batch or managing the global dispatcher.
///
/// None of these ever reach a `submit` caller; the consumer logs and
/// discards delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The batch could not be encoded as JSON.
    #[error("failed to serialize events: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request never got a response.
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The sink answered with a status other than 2xx or 409.
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    /// `global::init` was called twice.
    #[error("global dispatcher already initialised")]
    AlreadyInitialised,

    /// A global operation needed `global::init` first.
    #[error("global dispatcher not initialised")]
    NotInitialised,

    /// The dispatcher runtime could not be built.
    #[error("dispatcher runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl DispatchError {
    pub fn server(status: u16, body: impl Into<String>) -> Self {
        DispatchError::Server {
            status,
            body: body.into(),
        }
    }
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
