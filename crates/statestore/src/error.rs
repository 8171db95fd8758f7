//! Error types for state persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from reading or writing provisioning state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Machine name cannot be used as a state file name
    #[error("invalid machine key '{name}': must be non-empty and contain no path separators")]
    InvalidKey { name: String },

    /// State file exists but cannot be parsed
    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error
    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
