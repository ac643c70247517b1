//! Error types for the flow compiler

use thiserror::Error;

/// Result type alias for compiler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the flow compiler
///
/// Every variant except `Runtime` aborts before a flow starts running.
#[derive(Debug, Error)]
pub enum Error {
    /// The graph fails validation: missing start/stop, no path, unresolved implementation
    #[error("Invalid flow: {0}")]
    Structural(String),

    /// Source generation failed: unresolvable type, unbound required parameter
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Toolchain diagnostics, verbatim
    #[error("Build failed:\n{0}")]
    Build(String),

    /// A component dependency could not be resolved
    #[error("Dependency error: {0}")]
    Dependency(String),

    /// The bundle cannot be opened, extracted or started
    #[error("Load error: {0}")]
    Load(String),

    /// The bundle's entry point does not match the host's runtime
    #[error("Context mismatch: {0}")]
    ContextMismatch(String),

    /// The flow ran and at least one worker failed
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<etlflow_runtime::Error> for Error {
    fn from(err: etlflow_runtime::Error) -> Self {
        match err {
            etlflow_runtime::Error::ContextMismatch(msg) => Error::ContextMismatch(msg),
            etlflow_runtime::Error::Io(e) => Error::Io(e),
            other => Error::Runtime(other.to_string()),
        }
    }
}

impl Error {
    /// True for failures reported before any generation work starts
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Structural(_))
    }
}
