//! Scripted in-memory connection provider.
//!
//! Records every statement with its binds and replays queued results in
//! order. When the queue is empty a statement returns an empty result.
//! Connections count acquisitions and releases, and transactions count
//! commits and rollbacks, so tests can check resource handling on error paths.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use pizzeria_query::{BindParams, Row, SqlValue};

use crate::error::StorageError;
use crate::traits::{ConnectionProvider, ExecuteResult, SqlExecutor, Transaction};

/// One executed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub sql: String,
    pub binds: BindParams,
    pub in_transaction: bool,
}

#[derive(Debug, Default)]
struct ScriptState {
    responses: VecDeque<Result<ExecuteResult, StorageError>>,
    statements: Vec<RecordedStatement>,
    acquired: usize,
    released: usize,
    commits: usize,
    rollbacks: usize,
    unavailable: bool,
}

/// A [`ConnectionProvider`] that replays scripted results.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a query result.
    pub fn push_rows(&self, rows: Vec<Row>) -> &Self {
        self.push_result(ExecuteResult::with_rows(rows))
    }

    pub fn push_result(&self, result: ExecuteResult) -> &Self {
        self.lock().responses.push_back(Ok(result));
        self
    }

    pub fn push_error(&self, err: StorageError) -> &Self {
        self.lock().responses.push_back(Err(err));
        self
    }

    /// Makes `ping` fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.lock().statements.clone()
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    /// Connections acquired and not yet released.
    pub fn open_connections(&self) -> usize {
        let state = self.lock();
        state.acquired - state.released
    }

    fn connect(&self, in_transaction: bool) -> ScriptedConnection {
        self.lock().acquired += 1;
        ScriptedConnection {
            state: Arc::clone(&self.state),
            in_transaction,
            finished: false,
        }
    }
}

#[async_trait]
impl ConnectionProvider for ScriptedProvider {
    async fn acquire(&self) -> Result<Box<dyn SqlExecutor>, StorageError> {
        Ok(Box::new(self.connect(false)))
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, StorageError> {
        Ok(Box::new(self.connect(true)))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        if self.lock().unavailable {
            return Err(StorageError::connection_error("scripted backend unavailable"));
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

struct ScriptedConnection {
    state: Arc<Mutex<ScriptState>>,
    in_transaction: bool,
    finished: bool,
}

impl ScriptedConnection {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SqlExecutor for ScriptedConnection {
    async fn execute(&mut self, sql: &str, binds: &BindParams) -> Result<ExecuteResult, StorageError> {
        let mut state = self.lock();
        state.statements.push(RecordedStatement {
            sql: sql.to_string(),
            binds: binds.clone(),
            in_transaction: self.in_transaction,
        });
        state.responses.pop_front().unwrap_or_else(|| Ok(ExecuteResult::default()))
    }
}

#[async_trait]
impl Transaction for ScriptedConnection {
    async fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        self.finished = true;
        self.lock().commits += 1;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        self.finished = true;
        self.lock().rollbacks += 1;
        Ok(())
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        let in_transaction = self.in_transaction;
        let finished = self.finished;
        let mut state = self.lock();
        state.released += 1;
        if in_transaction && !finished {
            state.rollbacks += 1;
        }
    }
}

/// Builds a row from `(alias, value)` pairs.
pub fn row<K, V, I>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<SqlValue>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
