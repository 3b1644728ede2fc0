//! Connection pool for the PostgreSQL backend.

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result};

pub type PgPoolOptions = PoolOptions<Postgres>;

/// Pool options for `config`, without connecting.
pub fn pool_options(config: &PostgresConfig) -> Result<PgPoolOptions> {
    let limits = config.pool_limits()?;
    let options = PgPoolOptions::new()
        .max_connections(limits.max)
        .min_connections(limits.min)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout());
    Ok(options)
}

#[instrument(skip(config), fields(url = %mask_password(&config.url)))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    let options = pool_options(config)?;
    info!(
        max_connections = options.get_max_connections(),
        min_connections = options.get_min_connections(),
        acquire_timeout_ms = config.connect_timeout_ms,
        "Creating PostgreSQL connection pool"
    );

    let pool = options.connect(&config.url).await?;
    debug!("PostgreSQL connection pool created");
    Ok(pool)
}

/// Round-trips `SELECT 1` through the pool.
#[instrument(skip(pool))]
pub async fn test_connection(pool: &PgPool) -> Result<()> {
    sqlx_core::query::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(PostgresError::from)?;
    Ok(())
}

/// Replaces the password of a connection URL with `****` for logging.
///
/// Only the authority (between `://` and the first `/` or `?`) is
/// inspected, so the database name and query string are never touched.
pub fn mask_password(url: &str) -> String {
    let authority_start = url.find("://").map_or(0, |p| p + 3);
    let authority_len = url[authority_start..]
        .find(['/', '?'])
        .unwrap_or(url.len() - authority_start);
    let authority = &url[authority_start..authority_start + authority_len];

    let Some(at) = authority.rfind('@') else {
        return url.to_string();
    };
    let Some(colon) = authority[..at].find(':') else {
        return url.to_string();
    };
    format!(
        "{}****{}",
        &url[..authority_start + colon + 1],
        &url[authority_start + at..]
    )
}
