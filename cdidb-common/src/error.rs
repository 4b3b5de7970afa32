//! Common error types for cdidb

use thiserror::Error;

/// Common result type for cdidb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across cdidb crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Checklist format, percentile table or presentation definition error
    #[error("Format definition error: {0}")]
    FormatDefinition(String),

    /// Ingest batch error, pinned to the source spreadsheet column
    #[error("Ingest error in column {column}: {message}")]
    Ingest { column: usize, message: String },

    /// Required confirmation was not given before a destructive operation
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::FormatDefinition(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::InvalidInput(format!("CSV error: {}", err))
    }
}

impl Error {
    /// Build an ingest error for the given source column.
    pub fn ingest(column: usize, message: impl Into<String>) -> Self {
        Error::Ingest {
            column,
            message: message.into(),
        }
    }
}
