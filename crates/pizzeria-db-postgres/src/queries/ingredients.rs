//! Ingredients.

use std::sync::Arc;

use indexmap::IndexSet;
use tracing::debug;

use pizzeria_query::{BindParams, Schemas, SqlValue};
use pizzeria_storage::{ConnectionProvider, SqlExecutor, StorageError};

use super::resource::ResourceDao;

/// Builds the DAO for `INGREDIENTS`.
pub fn ingredient_dao(provider: Arc<dyn ConnectionProvider>, schemas: &Schemas) -> ResourceDao {
    ResourceDao::new(provider, schemas.ingredients.clone())
}

/// Returns `true` when every id in `ids` names an existing ingredient.
///
/// Runs `SELECT COUNT(*) AS "count" FROM INGREDIENTS WHERE ID IN (:id0, …)`
/// with one bind per distinct id, named by position. An empty list trivially
/// exists.
pub async fn check_ingredients_exist<E>(executor: &mut E, ids: &[i64]) -> Result<bool, StorageError>
where
    E: SqlExecutor + ?Sized,
{
    let distinct: IndexSet<i64> = ids.iter().copied().collect();
    if distinct.is_empty() {
        return Ok(true);
    }

    let mut binds = BindParams::new();
    let placeholders: Vec<String> = distinct
        .iter()
        .enumerate()
        .map(|(index, id)| {
            let name = format!("id{index}");
            binds.insert_in(name.clone(), *id);
            format!(":{name}")
        })
        .collect();
    let sql = format!(
        "SELECT COUNT(*) AS \"count\" FROM INGREDIENTS WHERE ID IN ({})",
        placeholders.join(", ")
    );

    let result = executor.execute(&sql, &binds).await?;
    let count = result
        .rows
        .first()
        .and_then(|row| row.get("count"))
        .and_then(SqlValue::as_i64)
        .unwrap_or(0);
    debug!(requested = distinct.len(), found = count, "Checked ingredient ids");
    Ok(usize::try_from(count).is_ok_and(|found| found == distinct.len()))
}
