//! Executor, transaction and connection-provider traits.
//!
//! DAOs talk to the database only through these traits: they hand SQL with
//! named `:name` placeholders plus a [`BindParams`] map to an executor and
//! read back rows and out-binds. Backends decide how placeholders and
//! out-binds are realized.

use async_trait::async_trait;
use pizzeria_query::{BindParams, OutBinds, Row};

use crate::error::StorageError;

/// Result of executing one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteResult {
    /// Rows returned by a query, keyed by column alias.
    pub rows: Vec<Row>,
    /// Declared out-binds, one value per affected row.
    pub out_binds: OutBinds,
    /// Rows inserted, updated or deleted.
    pub rows_affected: u64,
}

impl ExecuteResult {
    /// A query result with the given rows.
    pub fn with_rows(rows: Vec<Row>) -> Self {
        let rows_affected = rows.len() as u64;
        Self {
            rows,
            out_binds: OutBinds::new(),
            rows_affected,
        }
    }

    /// A write result with the given out-binds.
    pub fn with_out_binds(out_binds: OutBinds) -> Self {
        let rows_affected = out_binds.values().map(Vec::len).max().unwrap_or(0) as u64;
        Self {
            rows: Vec::new(),
            out_binds,
            rows_affected,
        }
    }

    /// A write result that returns nothing.
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }
}

/// Executes parametrized statements on one connection.
///
/// The connection is released when the executor is dropped, on every path.
#[async_trait]
pub trait SqlExecutor: Send {
    /// Executes `sql` with named binds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConstraintViolation` when the database rejects
    /// the statement because of a constraint, and `StorageError::Database`
    /// for other database failures.
    async fn execute(&mut self, sql: &str, binds: &BindParams) -> Result<ExecuteResult, StorageError>;
}

/// An executor whose statements commit or roll back together.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait Transaction: SqlExecutor {
    /// Commits all statements executed in this transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::TransactionError` if the commit fails.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Rolls back all statements executed in this transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::TransactionError` if the rollback fails.
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

/// Hands out request-scoped executors.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Acquires a connection for a single request.
    async fn acquire(&self) -> Result<Box<dyn SqlExecutor>, StorageError>;

    /// Acquires a connection and begins a transaction on it.
    async fn begin(&self) -> Result<Box<dyn Transaction>, StorageError>;

    /// Checks that the backend answers queries.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Returns the name of this backend (for logs).
    fn backend_name(&self) -> &'static str;
}
