//! DAO for resources stored in a single table (doughs, ingredients).

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, instrument};

use pizzeria_query::{
    BindParams, FilterProcessor, RawResource, ResourceDocument, ResourceSchema, SqlValue,
    convert_out_binds_to_raw_resource, get_bind_params,
};
use pizzeria_storage::{ConnectionProvider, StorageError};

use super::common::{ensure_returned_id, insert_statement, parse_id, returned_rows, single_row, update_statement};

/// Reads and writes one flat resource.
#[derive(Clone)]
pub struct ResourceDao {
    provider: Arc<dyn ConnectionProvider>,
    schema: Arc<ResourceSchema>,
    filters: Arc<FilterProcessor>,
    allowed_properties: Arc<IndexSet<&'static str>>,
}

impl ResourceDao {
    pub fn new(provider: Arc<dyn ConnectionProvider>, schema: ResourceSchema) -> Self {
        let filters = schema.filter_processor(false);
        let allowed_properties = schema.allowed_properties();
        Self {
            provider,
            schema: Arc::new(schema),
            filters: Arc::new(filters),
            allowed_properties: Arc::new(allowed_properties),
        }
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    pub fn filter_processor(&self) -> &FilterProcessor {
        &self.filters
    }

    /// Lists resources matching the declared filters in `filters`.
    /// Undeclared filters are ignored.
    #[instrument(skip(self, filters), fields(resource = self.schema.path))]
    pub async fn get(&self, filters: &IndexMap<String, SqlValue>) -> Result<Vec<RawResource>, StorageError> {
        let processed = self.filters.process_get_filters(filters);
        let sql = format!(
            "SELECT {} FROM {}{}",
            self.schema.select_list(),
            self.schema.table,
            processed.where_clause()
        );

        let mut conn = self.provider.acquire().await?;
        let result = conn.execute(&sql, &processed.bind_params).await?;
        debug!(count = result.rows.len(), "Fetched resources");
        Ok(result.rows)
    }

    /// Fetches one resource; `None` when no row has this id.
    #[instrument(skip(self), fields(resource = self.schema.path))]
    pub async fn get_by_id(&self, id: &str) -> Result<Option<RawResource>, StorageError> {
        let Some(numeric_id) = parse_id(id) else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE ID = :id",
            self.schema.select_list(),
            self.schema.table
        );
        let binds = BindParams::new().with("id", numeric_id);

        let mut conn = self.provider.acquire().await?;
        let result = conn.execute(&sql, &binds).await?;
        single_row(result.rows, self.schema.resource_type, id)
    }

    /// Inserts a resource and returns it as stored.
    #[instrument(skip(self, body), fields(resource = self.schema.path))]
    pub async fn post(&self, body: &ResourceDocument) -> Result<RawResource, StorageError> {
        let binds = get_bind_params(body, &self.allowed_properties, &self.schema.out_bind_params())?;
        let sql = insert_statement(&self.schema, &binds)?;

        let mut conn = self.provider.acquire().await?;
        let result = conn.execute(&sql, &binds).await?;
        if returned_rows(&result.out_binds) != 1 {
            return Err(StorageError::consistency(format!(
                "INSERT into {} returned {} rows",
                self.schema.table,
                returned_rows(&result.out_binds)
            )));
        }
        let created = convert_out_binds_to_raw_resource(&result.out_binds);
        debug!(id = ?created.get("id"), "Created resource");
        Ok(created)
    }

    /// Applies the body's attributes to the resource named by `data.id`.
    ///
    /// A body without attributes is a plain read. Returns `None` when no row
    /// has this id.
    #[instrument(skip(self, body), fields(resource = self.schema.path, id = ?body.id()))]
    pub async fn patch(&self, body: &ResourceDocument) -> Result<Option<RawResource>, StorageError> {
        let id = body
            .id()
            .ok_or_else(|| StorageError::internal("PATCH body without data.id"))?;
        if body.attributes().is_empty() {
            return self.get_by_id(id).await;
        }
        let Some(numeric_id) = parse_id(id) else {
            return Ok(None);
        };

        let mut binds = get_bind_params(body, &self.allowed_properties, &self.schema.out_bind_params())?;
        let sql = update_statement(&self.schema, &binds)?;
        binds.insert_in("id", numeric_id);

        let mut conn = self.provider.acquire().await?;
        let result = conn.execute(&sql, &binds).await?;
        match returned_rows(&result.out_binds) {
            0 => return Ok(None),
            1 => {}
            n => {
                return Err(StorageError::consistency(format!(
                    "UPDATE of {} {id} touched {n} rows",
                    self.schema.resource_type
                )));
            }
        }
        let updated = convert_out_binds_to_raw_resource(&result.out_binds);
        ensure_returned_id(&updated, self.schema.resource_type, numeric_id)?;
        Ok(Some(updated))
    }
}

impl std::fmt::Debug for ResourceDao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceDao")
            .field("resource", &self.schema.path)
            .field("backend", &self.provider.backend_name())
            .finish()
    }
}
