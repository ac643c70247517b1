//! Error types for the etlflow runtime

use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the etlflow runtime
#[derive(Debug, Error)]
pub enum Error {
    /// A parameter was set that the component does not declare, or with an unusable value
    #[error("Invalid parameter '{name}': {reason}")]
    Parameter { name: String, reason: String },

    /// A required parameter has neither a value nor a default
    #[error("Missing required parameter '{0}'")]
    MissingParameter(String),

    /// Every upstream producer went away before sending its terminator
    #[error("Upstream of '{node}' closed before end of stream")]
    UpstreamClosed { node: String },

    /// A downstream consumer stopped receiving while rows were still being sent
    #[error("Downstream consumer '{consumer}' of '{node}' is closed")]
    DownstreamClosed { node: String, consumer: String },

    /// Component-specific failure raised while a worker runs
    #[error("Component error: {0}")]
    Component(String),

    /// Wiring or supervision failure
    #[error("Worker error: {0}")]
    Worker(String),

    /// One or more workers failed during a run
    #[error("Flow run failed: {0}")]
    RunFailed(String),

    /// The launcher was started in an environment it does not belong to
    #[error("Launch error: {0}")]
    Launch(String),

    /// The loader expects a different flow or runtime than the one linked in
    #[error("Context mismatch: {0}")]
    ContextMismatch(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::Component`]
    pub fn component(message: impl Into<String>) -> Self {
        Error::Component(message.into())
    }

    /// Shorthand for [`Error::Parameter`]
    pub fn parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Parameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
