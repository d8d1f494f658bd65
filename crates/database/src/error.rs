//! Database error types.

use std::fmt;

use sqlx::error::ErrorKind;
use thiserror::Error;

use crate::policy::{Action, Role, Table};
use crate::validation::ValidationError;

/// Kind of store-native constraint that rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// A `CHECK` constraint (enumeration, format, range).
    Check,
    /// A required column was missing.
    NotNull,
    /// A reference pointed at a row that does not exist.
    ForeignKey,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::Check => "check",
            ConstraintKind::NotNull => "not-null",
            ConstraintKind::ForeignKey => "foreign key",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// SQLx error (connection, query, etc.)
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// JSON column could not be encoded or decoded
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Record already exists (unique violation)
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// Write rejected by a store constraint
    #[error("{entity} violates {kind} constraint: {message}")]
    Constraint {
        entity: &'static str,
        kind: ConstraintKind,
        message: String,
    },

    /// Input rejected before reaching the store
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Caller role is not granted the action on the table
    #[error("access denied: {role} may not {action} on {table}")]
    AccessDenied {
        role: Role,
        table: Table,
        action: Action,
    },
}

impl DatabaseError {
    /// Returns the constraint kind if this error is a constraint violation.
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            DatabaseError::Constraint { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Classify a failed write into a typed error.
///
/// Unique violations become [`DatabaseError::AlreadyExists`] keyed by `id`;
/// check, not-null and foreign key violations become
/// [`DatabaseError::Constraint`]. Anything else is passed through.
pub(crate) fn map_write_error(entity: &'static str, id: &str, e: sqlx::Error) -> DatabaseError {
    if let sqlx::Error::Database(ref db_err) = e {
        let kind = match db_err.kind() {
            ErrorKind::UniqueViolation => {
                return DatabaseError::AlreadyExists {
                    entity,
                    id: id.to_string(),
                };
            }
            ErrorKind::CheckViolation => Some(ConstraintKind::Check),
            ErrorKind::NotNullViolation => Some(ConstraintKind::NotNull),
            ErrorKind::ForeignKeyViolation => Some(ConstraintKind::ForeignKey),
            _ => None,
        };
        if let Some(kind) = kind {
            return DatabaseError::Constraint {
                entity,
                kind,
                message: db_err.message().to_string(),
            };
        }
    }
    DatabaseError::Sqlx(e)
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
