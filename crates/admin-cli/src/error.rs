//! Error types for the admin commands.

use thiserror::Error;

/// Errors that can occur while running an admin command.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Database error, including access denials.
    #[error("Database error: {0}")]
    Database(#[from] database::DatabaseError),

    /// Reading or writing a document file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A conversation document could not be parsed or rendered.
    #[error("Invalid conversation document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for admin operations.
pub type Result<T> = std::result::Result<T, AdminError>;
