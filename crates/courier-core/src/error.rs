//! Error types for courier-core

use thiserror::Error;

/// Result type alias using courier-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in courier-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Message not found
    #[error("Message not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Engine configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Origin provider failure
    #[error("Origin error: {0}")]
    Origin(String),
}
