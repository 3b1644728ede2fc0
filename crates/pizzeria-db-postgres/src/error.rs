//! Error types for the PostgreSQL storage backend.

use pizzeria_storage::{ConstraintKind, StorageError};
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for foreign key violations (23503).
pub const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

/// PostgreSQL error code for unique violations (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Errors specific to the PostgreSQL storage backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Error reported by sqlx or the database.
    #[error("Database error: {0}")]
    Sqlx(#[from] SqlxError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The SQL text references a placeholder with no input bind.
    #[error("No bind value for placeholder :{name}")]
    UnboundPlaceholder { name: String },

    /// A result column has a type the row decoder does not handle.
    #[error("Unsupported type {type_name} for column {column}")]
    UnsupportedColumn { column: String, type_name: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

fn classify_sqlx_error(err: SqlxError) -> StorageError {
    let kind = if has_pg_error_code(&err, PG_FOREIGN_KEY_VIOLATION) {
        Some(ConstraintKind::ForeignKey)
    } else if has_pg_error_code(&err, PG_UNIQUE_VIOLATION) {
        Some(ConstraintKind::Unique)
    } else {
        None
    };

    match err {
        SqlxError::Database(db_err) => match kind {
            Some(kind) => StorageError::ConstraintViolation {
                kind,
                constraint: db_err.constraint().map(str::to_string),
                message: db_err.message().to_string(),
            },
            None => StorageError::database(db_err.message().to_string()),
        },
        SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) | SqlxError::Tls(_) => {
            StorageError::connection_error(err.to_string())
        }
        other => StorageError::database(other.to_string()),
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Sqlx(e) => classify_sqlx_error(e),
            PostgresError::Migration(e) => StorageError::internal(format!("Migration error: {e}")),
            PostgresError::Config { message } => {
                StorageError::internal(format!("Configuration error: {message}"))
            }
            other @ (PostgresError::UnboundPlaceholder { .. }
            | PostgresError::UnsupportedColumn { .. }) => StorageError::internal(other.to_string()),
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
