//! Error types for guarded database operations

use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// A write statement was issued while read-only mode is on
    #[error(
        "Write queries are currently disabled. Enable with sql_read_only::enable_writes()."
    )]
    ReadOnly,

    /// Failed to connect to database
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed
    #[error("Query error: {0}")]
    QueryError(String),

    /// Database type not supported
    #[error("Unsupported database: {0}")]
    UnsupportedDatabase(String),

    /// Settings could not be loaded or have the wrong shape
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// sqlx database error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON settings could not be parsed
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl DatabaseError {
    /// True for the error raised by the read-only blocker
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}
