//! Error types for gao-dev-core

use thiserror::Error;

/// Main error type for the gao-dev-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error (transaction already rolled back)
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Database file missing at construction
    #[error("database not found: {0}")]
    Connection(String),

    /// Query for a specific key returned nothing
    #[error("record not found: {0}")]
    NotFound(String),

    /// Input failed enumeration/constraint checks before hitting the database
    #[error("validation error: {0}")]
    Validation(String),

    /// Transaction failed or was aborted
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Markdown sync failure (missing header keys, I/O)
    #[error("sync error: {0}")]
    Sync(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for gao-dev-core
pub type Result<T> = std::result::Result<T, Error>;
