//! Common error types for KTV

use thiserror::Error;

/// Common result type for KTV operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the KTV crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error (state file, catalog file, stored values)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML decode error (config file, catalog file)
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or ingested data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Persistence backend failure
    #[error("Store error: {0}")]
    Store(String),
}
