//! # pizzeria-storage
//!
//! Storage abstraction layer for the pizzeria API.
//!
//! This crate defines the error taxonomy and the traits DAOs use to run SQL.
//! It does not talk to a database itself; the Postgres backend lives in
//! `pizzeria-db-postgres`.
//!
//! ## Overview
//!
//! - [`SqlExecutor`]: executes a statement with named binds on one connection
//! - [`Transaction`]: an executor with `commit` / `rollback`
//! - [`ConnectionProvider`]: hands out executors and transactions per request
//!
//! ## Example
//!
//! ```ignore
//! use pizzeria_query::BindParams;
//! use pizzeria_storage::{ConnectionProvider, StorageError};
//!
//! async fn count_doughs(provider: &dyn ConnectionProvider) -> Result<usize, StorageError> {
//!     let mut conn = provider.acquire().await?;
//!     let result = conn.execute("SELECT ID AS \"id\" FROM DOUGHS", &BindParams::new()).await?;
//!     Ok(result.rows.len())
//! }
//! ```

mod error;
mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ConstraintKind, ErrorCategory, StorageError};
pub use traits::{ConnectionProvider, ExecuteResult, SqlExecutor, Transaction};
