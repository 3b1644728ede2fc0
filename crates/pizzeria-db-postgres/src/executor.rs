//! Statement execution on a single Postgres connection.
//!
//! Named placeholders are rewritten to `$n`, input binds are encoded from
//! [`SqlValue`]s and result columns are decoded back into them. Declared
//! out-binds are read from the columns a `RETURNING … AS "<name>Out"` clause
//! produces, one value per returned row.

use async_trait::async_trait;
use sqlx_core::column::Column;
use sqlx_core::pool::PoolConnection;
use sqlx_core::query::Query;
use sqlx_core::row::Row as _;
use sqlx_core::type_info::TypeInfo;
use sqlx_postgres::{PgArguments, PgConnection, PgRow, Postgres};
use tracing::{debug, trace};

use pizzeria_query::{BindParams, OutBinds, OutType, Row, SqlValue};
use pizzeria_storage::{ExecuteResult, SqlExecutor, StorageError};

use crate::error::{PostgresError, Result};
use crate::named::to_positional;

/// Executes `sql` with named binds on `conn`.
pub(crate) async fn run_statement(conn: &mut PgConnection, sql: &str, binds: &BindParams) -> Result<ExecuteResult> {
    let statement = to_positional(sql, binds)?;
    trace!(sql = %statement.sql, params = statement.values.len(), "Executing statement");

    let mut query: Query<'_, Postgres, PgArguments> = sqlx_core::query::query(&statement.sql);
    for value in &statement.values {
        query = bind_value(query, value);
    }

    if binds.has_out_binds() || returns_rows(&statement.sql) {
        let pg_rows = query.fetch_all(&mut *conn).await?;
        let rows = pg_rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
        let out_binds = collect_out_binds(&rows, binds);
        let rows_affected = rows.len() as u64;
        Ok(ExecuteResult {
            rows,
            out_binds,
            rows_affected,
        })
    } else {
        let done = query.execute(&mut *conn).await?;
        Ok(ExecuteResult::affected(done.rows_affected()))
    }
}

fn bind_value<'q>(query: Query<'q, Postgres, PgArguments>, value: &SqlValue) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Integer(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Boolean(b) => query.bind(*b),
        // An untyped NULL is sent as int8; Postgres assignment casts accept
        // it for both integer and text columns.
        SqlValue::Null => query.bind(None::<i64>),
    }
}

fn returns_rows(sql: &str) -> bool {
    let upper = sql.trim_start().to_ascii_uppercase();
    upper.starts_with("SELECT") || upper.starts_with("WITH") || upper.contains(" RETURNING ")
}

/// Decodes a row into `SqlValue`s keyed by column name.
fn decode_row(row: &PgRow) -> Result<Row> {
    let mut decoded = Row::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        let value = match type_name {
            "INT2" => row.try_get::<Option<i16>, _>(index)?.map(|v| SqlValue::Integer(v.into())),
            "INT4" => row.try_get::<Option<i32>, _>(index)?.map(|v| SqlValue::Integer(v.into())),
            "INT8" => row.try_get::<Option<i64>, _>(index)?.map(SqlValue::Integer),
            "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(|v| SqlValue::Float(v.into())),
            "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(SqlValue::Float),
            "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(SqlValue::Boolean),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                row.try_get::<Option<String>, _>(index)?.map(SqlValue::Text)
            }
            other => {
                return Err(PostgresError::UnsupportedColumn {
                    column: column.name().to_string(),
                    type_name: other.to_string(),
                });
            }
        };
        decoded.insert(column.name().to_string(), value.unwrap_or(SqlValue::Null));
    }
    Ok(decoded)
}

/// Collects each declared out-bind column across the returned rows,
/// coerced to its declared logical type.
fn collect_out_binds(rows: &[Row], binds: &BindParams) -> OutBinds {
    binds
        .out_binds()
        .map(|(name, out_type)| {
            let values = rows
                .iter()
                .map(|row| coerce_out_value(row.get(name).cloned().unwrap_or(SqlValue::Null), out_type))
                .collect();
            (name.to_string(), values)
        })
        .collect()
}

fn coerce_out_value(value: SqlValue, out_type: OutType) -> SqlValue {
    match (out_type, value) {
        (OutType::String, SqlValue::Integer(i)) => SqlValue::Text(i.to_string()),
        (OutType::String, SqlValue::Float(f)) => SqlValue::Text(f.to_string()),
        (OutType::Number, SqlValue::Text(s)) => s
            .parse::<i64>()
            .map(SqlValue::Integer)
            .or_else(|_| s.parse::<f64>().map(SqlValue::Float))
            .unwrap_or(SqlValue::Text(s)),
        (_, value) => value,
    }
}

/// A pooled connection used for single-statement requests.
///
/// The connection returns to the pool when this value is dropped.
pub struct PooledConnection {
    conn: PoolConnection<Postgres>,
}

impl PooledConnection {
    pub(crate) fn new(conn: PoolConnection<Postgres>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SqlExecutor for PooledConnection {
    async fn execute(&mut self, sql: &str, binds: &BindParams) -> std::result::Result<ExecuteResult, StorageError> {
        let result = run_statement(&mut self.conn, sql, binds).await?;
        debug!(rows = result.rows.len(), rows_affected = result.rows_affected, "Statement executed");
        Ok(result)
    }
}
