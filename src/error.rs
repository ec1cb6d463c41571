//! Error types for officelm
//!
//! Defines the error enum covering failure modes of the cache store and its
//! configuration. Uses thiserror for ergonomic error handling.
//!
//! Only construction-time failures (opening the database, loading config)
//! reach callers of the public cache API. Per-operation failures are logged
//! and degraded to misses inside [`crate::cache::CacheManager`].

use thiserror::Error;

/// Result type alias for officelm operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Error type for officelm operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage errors not covered by the SQLite driver
    #[error("Storage error: {0}")]
    Storage(String),

    /// Parsing errors (user-supplied JSON)
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A blocking task on the runtime's pool panicked or was cancelled
    #[error("Task error: {0}")]
    Task(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        CacheError::Task(err.to_string())
    }
}
