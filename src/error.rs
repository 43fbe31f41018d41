//! Error types for the idle engine and its timer substrates.

/// Errors raised by the idle engine, settings store, and timer substrates.
#[derive(Debug, thiserror::Error)]
pub enum IdleError {
    /// Invalid settings combination (never silently coerced).
    #[error("config error: {0}")]
    Config(String),

    /// Settings persistence failure.
    #[error("settings error: {0}")]
    Settings(String),

    /// Timer substrate unreachable or rejected a command.
    #[error("substrate error: {0}")]
    Substrate(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, IdleError>;
