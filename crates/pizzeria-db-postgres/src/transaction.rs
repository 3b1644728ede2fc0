//! PostgreSQL transactions for multi-statement writes.

use async_trait::async_trait;
use sqlx_postgres::PgTransaction;
use tracing::debug;

use pizzeria_query::BindParams;
use pizzeria_storage::{ExecuteResult, SqlExecutor, StorageError, Transaction};

use crate::executor::run_statement;

/// PostgreSQL transaction wrapper.
///
/// Wraps an sqlx transaction on a pooled connection. The transaction rolls
/// back on drop if it was not committed, and the connection returns to the
/// pool either way.
pub struct PostgresTransaction {
    /// `None` once committed or rolled back.
    tx: Option<PgTransaction<'static>>,
}

impl PostgresTransaction {
    pub(crate) fn new(tx: PgTransaction<'static>) -> Self {
        Self { tx: Some(tx) }
    }
}

#[async_trait]
impl SqlExecutor for PostgresTransaction {
    async fn execute(&mut self, sql: &str, binds: &BindParams) -> Result<ExecuteResult, StorageError> {
        let conn = self.tx.as_deref_mut().ok_or_else(|| {
            StorageError::transaction_error("Transaction already completed (committed or rolled back)")
        })?;
        Ok(run_statement(conn, sql, binds).await?)
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.map_err(|e| {
                StorageError::transaction_error(format!("Failed to commit transaction: {e}"))
            })?;
            debug!("Transaction committed successfully");
        }
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.map_err(|e| {
                StorageError::transaction_error(format!("Failed to rollback transaction: {e}"))
            })?;
            debug!("Transaction rolled back successfully");
        }
        Ok(())
    }
}
