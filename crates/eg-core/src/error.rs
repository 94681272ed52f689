//! Error types for egcalib

use thiserror::Error;

/// egcalib error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error (malformed correction tables, bad inputs)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error: a required collaborator is missing.
    ///
    /// Aborts the whole batch.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
