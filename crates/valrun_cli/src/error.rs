//! CLI error types.

use thiserror::Error;

/// Result alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Categorised CLI failures
#[derive(Debug, Error)]
pub enum CliError {
    /// An input file does not exist
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// An argument is malformed or unsupported
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An input file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An input file could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The engine rejected or failed the operation
    #[error("Engine error: {0}")]
    Engine(#[from] valrun_runtime::EngineError),

    /// The store failed
    #[error("Store error: {0}")]
    Store(#[from] valrun_store::StoreError),

    /// The run finished in a failed state
    #[error("Run finished as {0}")]
    RunFailed(valrun_store::RunState),
}
