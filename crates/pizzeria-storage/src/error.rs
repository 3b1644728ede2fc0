//! Storage error types for the pizzeria storage layer.
//!
//! This module defines all error types that can occur during storage operations.

use std::fmt;

use pizzeria_query::QueryError;

/// Kind of constraint a database rejected a write with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    ForeignKey,
    Unique,
}

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested resource was not found.
    #[error("Resource not found: {resource_type}/{id}")]
    NotFound {
        /// The type of resource that was not found.
        resource_type: String,
        /// The ID of the resource that was not found.
        id: String,
    },

    /// A request referenced related resources that do not exist.
    #[error("Request includes invalid {relation} ids: {}", .ids.join(", "))]
    RelationNotFound {
        /// Name of the relationship (`dough`, `ingredients`).
        relation: String,
        /// The offending identifiers.
        ids: Vec<String>,
    },

    /// An attribute outside the resource's declared properties reached
    /// persistence code.
    #[error("Invalid attribute {name} found")]
    InvalidAttribute {
        /// The attribute name.
        name: String,
    },

    /// The database returned data that breaks an invariant, such as two rows
    /// for one primary key.
    #[error("Internal consistency error: {message}")]
    Consistency {
        /// Description of the broken invariant.
        message: String,
    },

    /// The database rejected a write because of a constraint.
    #[error("Constraint violation ({}): {message}", .constraint.as_deref().unwrap_or("unnamed"))]
    ConstraintViolation {
        /// Which kind of constraint failed.
        kind: ConstraintKind,
        /// The constraint name reported by the database, if any.
        constraint: Option<String>,
        /// Database message.
        message: String,
    },

    /// An unclassified database error.
    #[error("Database error: {message}")]
    Database {
        /// Database message.
        message: String,
    },

    /// An error occurred during a transaction.
    #[error("Transaction error: {message}")]
    TransactionError {
        /// Description of the transaction error.
        message: String,
    },

    /// Failed to connect to the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Creates a new `RelationNotFound` error.
    #[must_use]
    pub fn relation_not_found<I, S>(relation: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::RelationNotFound {
            relation: relation.into(),
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a new `Consistency` error.
    #[must_use]
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Creates a new `Database` error.
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Creates a new `TransactionError` error.
    #[must_use]
    pub fn transaction_error(message: impl Into<String>) -> Self {
        Self::TransactionError {
            message: message.into(),
        }
    }

    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a relation not found error.
    #[must_use]
    pub fn is_relation_not_found(&self) -> bool {
        matches!(self, Self::RelationNotFound { .. })
    }

    /// Returns `true` if this is a foreign key violation.
    #[must_use]
    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(
            self,
            Self::ConstraintViolation {
                kind: ConstraintKind::ForeignKey,
                ..
            }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } | Self::RelationNotFound { .. } => ErrorCategory::NotFound,
            Self::ConstraintViolation { .. } => ErrorCategory::Conflict,
            Self::TransactionError { .. } => ErrorCategory::Transaction,
            Self::ConnectionError { .. } => ErrorCategory::Infrastructure,
            Self::InvalidAttribute { .. }
            | Self::Consistency { .. }
            | Self::Database { .. }
            | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<QueryError> for StorageError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidAttribute(name) => Self::InvalidAttribute { name },
            other => Self::internal(other.to_string()),
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Resource or related resource not found.
    NotFound,
    /// Constraint conflict.
    Conflict,
    /// Transaction-related error.
    Transaction,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Transaction => write!(f, "transaction"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("dough", "123");
        assert_eq!(err.to_string(), "Resource not found: dough/123");

        let err = StorageError::relation_not_found("ingredients", ["4", "9"]);
        assert_eq!(err.to_string(), "Request includes invalid ingredients ids: 4, 9");

        let err = StorageError::ConstraintViolation {
            kind: ConstraintKind::ForeignKey,
            constraint: None,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "Constraint violation (unnamed): boom");
    }

    #[test]
    fn test_error_predicates() {
        let err = StorageError::not_found("pizza", "1");
        assert!(err.is_not_found());
        assert!(!err.is_relation_not_found());

        let err = StorageError::relation_not_found("dough", ["7"]);
        assert!(err.is_relation_not_found());
        assert!(!err.is_foreign_key_violation());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::not_found("pizza", "1").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StorageError::consistency("two rows for id 1").category(),
            ErrorCategory::Internal
        );
        assert_eq!(
            StorageError::connection_error("refused").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::NotFound.to_string(), "not_found");
    }

    #[test]
    fn test_from_query_error() {
        let err: StorageError = QueryError::InvalidAttribute("abc".into()).into();
        assert!(matches!(err, StorageError::InvalidAttribute { ref name } if name == "abc"));
        assert_eq!(err.to_string(), "Invalid attribute abc found");
    }
}
