//! Error types for pipeline admission

use thiserror::Error;

/// Core error type for admission and persistence operations
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// Durable store operation failed
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Snapshot encoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot could not be decoded on import
    #[error("Snapshot decode error: {0}")]
    SnapshotDecode(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Durable-store specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Not found")]
    NotFound,
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db_err) => Self::Query(db_err.message().to_string()),
            sqlx::Error::PoolTimedOut => Self::Connection("Pool timeout".to_string()),
            sqlx::Error::PoolClosed => Self::Connection("Pool closed".to_string()),
            sqlx::Error::Io(io) => Self::Connection(io.to_string()),
            _ => Self::Query(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for AdmissionError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.into())
    }
}

impl From<config::ConfigError> for AdmissionError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for admission operations
pub type Result<T> = std::result::Result<T, AdmissionError>;
