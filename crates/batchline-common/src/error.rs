//! Error types for Batchline

use thiserror::Error;

/// Result type alias for Batchline configuration and setup operations
pub type Result<T> = std::result::Result<T, BatchlineError>;

/// Main error type for Batchline
#[derive(Error, Debug)]
pub enum BatchlineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
}

impl BatchlineError {
    /// Shorthand for an [`BatchlineError::InvalidParameter`]
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
