//! PostgreSQL implementation of the `ConnectionProvider` trait.

use async_trait::async_trait;
use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use pizzeria_storage::{ConnectionProvider, SqlExecutor, StorageError, Transaction};

use crate::config::PostgresConfig;
use crate::error::PostgresError;
use crate::executor::PooledConnection;
use crate::migrations;
use crate::pool;
use crate::transaction::PostgresTransaction;

/// PostgreSQL storage backend.
///
/// Each request acquires one connection from the pool; multi-statement
/// writes run in a transaction on one connection.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates a new PostgreSQL storage backend.
    ///
    /// This will:
    /// 1. Create a connection pool
    /// 2. Run migrations if configured
    ///
    /// # Errors
    ///
    /// Returns an error if the connection pool cannot be created
    /// or if migrations fail.
    #[instrument(skip(config), fields(url = %pool::mask_password(&config.url)))]
    pub async fn new(config: PostgresConfig) -> Result<Self, StorageError> {
        let pool = pool::create_pool(&config).await?;

        if config.run_migrations {
            migrations::run(&pool).await?;
        }

        info!("PostgreSQL storage initialized");
        Ok(Self { pool })
    }

    /// Creates a new `PostgresStorage` from an existing connection pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionProvider for PostgresStorage {
    async fn acquire(&self) -> Result<Box<dyn SqlExecutor>, StorageError> {
        let conn = self.pool.acquire().await.map_err(PostgresError::from)?;
        Ok(Box::new(PooledConnection::new(conn)))
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, StorageError> {
        let tx = self.pool.begin().await.map_err(PostgresError::from)?;
        Ok(Box::new(PostgresTransaction::new(tx)))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        pool::test_connection(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
