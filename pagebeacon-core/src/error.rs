//! Error types for pagebeacon-core

use thiserror::Error;

/// Main error type for the pagebeacon-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    ///
    /// Fatal to tracker initialization only.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure transmitting a single payload or parsing its acknowledgment
    ///
    /// Reported and swallowed by the dispatcher; never retried.
    #[error("delivery error: {0}")]
    Delivery(String),
}

/// Result type alias for pagebeacon-core
pub type Result<T> = std::result::Result<T, Error>;
