//! Error types for MMDStream

use thiserror::Error;

/// MMDStream error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (missing kernel, unsupported method combination, bad block layout)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kernel evaluation failed on a block
    #[error("Kernel evaluation error: {0}, try using fewer blocks per burst")]
    Evaluation(String),

    /// Data stream produced no samples where at least one batch was expected
    #[error("Stream error: {0}")]
    Stream(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
