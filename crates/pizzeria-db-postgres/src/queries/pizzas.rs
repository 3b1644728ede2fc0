//! Pizzas and their dough / ingredient relationships.
//!
//! Reads always go through the prefixed select (`PIZZAS.NAME AS "PIZZA_name"`)
//! and the [`JoinRowGrouper`], with the dough and ingredient joins added when
//! the caller includes them. Writes that touch `PIZZA_INGREDIENTS` run in one
//! transaction together with the pizza row.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, instrument, warn};

use pizzeria_query::{
    BindParams, FilterProcessor, JoinRowGrouper, RawPizza, RawResource, ResourceDocument, Schemas, SqlValue,
    convert_out_binds_to_raw_resource, get_bind_params,
};
use pizzeria_storage::{ConnectionProvider, ConstraintKind, SqlExecutor, StorageError};

use super::common::{ensure_returned_id, insert_statement, parse_id, returned_rows, update_statement};
use super::ingredients::check_ingredients_exist;

/// Foreign key from `PIZZAS.DOUGH_ID`, as Postgres reports it.
const DOUGH_FK: &str = "pizzas_dough_fk";
/// Foreign key from `PIZZA_INGREDIENTS.INGREDIENT_ID`.
const INGREDIENT_FK: &str = "pizza_ingredients_ingredient_fk";

const JOIN_DOUGHS: &str = " LEFT JOIN DOUGHS ON PIZZAS.DOUGH_ID = DOUGHS.ID";
const JOIN_INGREDIENTS: &str = " LEFT JOIN PIZZA_INGREDIENTS ON PIZZAS.ID = PIZZA_INGREDIENTS.PIZZA_ID \
     LEFT JOIN INGREDIENTS ON INGREDIENTS.ID = PIZZA_INGREDIENTS.INGREDIENT_ID";

/// Relations to embed in a pizza read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PizzaIncludes {
    pub dough: bool,
    pub ingredients: bool,
}

impl PizzaIncludes {
    pub const NONE: Self = Self {
        dough: false,
        ingredients: false,
    };

    /// From relationship names as returned by `ResourceSchema::parse_includes`.
    pub fn from_names(names: &[&str]) -> Self {
        Self {
            dough: names.contains(&"dough"),
            ingredients: names.contains(&"ingredients"),
        }
    }
}

/// Relationship changes carried by a write body.
#[derive(Debug, Default)]
struct RelationshipWrites {
    /// `Some(None)` clears the dough.
    dough: Option<Option<i64>>,
    /// Replacement ingredient list.
    ingredients: Option<Vec<i64>>,
}

impl RelationshipWrites {
    /// Reads the relationship members of `body`. Identifiers that are not
    /// integers cannot name a row and are reported as missing.
    fn from_body(body: &ResourceDocument) -> Result<Self, StorageError> {
        let dough = match body.to_one("dough") {
            None => None,
            Some(None) => Some(None),
            Some(Some(identifier)) => {
                let id = parse_id(&identifier.id)
                    .ok_or_else(|| StorageError::relation_not_found("dough", [identifier.id.clone()]))?;
                Some(Some(id))
            }
        };

        let ingredients = match body.to_many("ingredients") {
            None => None,
            Some(identifiers) => {
                let invalid: Vec<String> = identifiers
                    .iter()
                    .filter(|identifier| parse_id(&identifier.id).is_none())
                    .map(|identifier| identifier.id.clone())
                    .collect();
                if !invalid.is_empty() {
                    return Err(StorageError::relation_not_found("ingredients", invalid));
                }
                Some(identifiers.iter().filter_map(|identifier| parse_id(&identifier.id)).collect())
            }
        };

        Ok(Self { dough, ingredients })
    }

    fn ingredient_ids(&self) -> &[i64] {
        self.ingredients.as_deref().unwrap_or_default()
    }

    /// Attributes a foreign key violation to the relation it guards.
    fn translate(&self, err: StorageError) -> StorageError {
        let relation = match &err {
            StorageError::ConstraintViolation {
                kind: ConstraintKind::ForeignKey,
                constraint: Some(constraint),
                ..
            } => match constraint.to_ascii_lowercase().as_str() {
                DOUGH_FK => Some("dough"),
                INGREDIENT_FK => Some("ingredients"),
                _ => None,
            },
            _ => None,
        };
        match relation {
            Some("dough") => StorageError::relation_not_found(
                "dough",
                self.dough.flatten().map(|id| id.to_string()),
            ),
            Some(_) => StorageError::relation_not_found("ingredients", self.ingredient_ids().iter().map(i64::to_string)),
            None => err,
        }
    }
}

/// Reads and writes pizzas.
#[derive(Clone)]
pub struct PizzaDao {
    provider: Arc<dyn ConnectionProvider>,
    schemas: Arc<Schemas>,
    filters: Arc<FilterProcessor>,
    grouper: Arc<JoinRowGrouper>,
    allowed_properties: Arc<IndexSet<&'static str>>,
}

impl PizzaDao {
    pub fn new(provider: Arc<dyn ConnectionProvider>, schemas: &Schemas) -> Self {
        let grouper = JoinRowGrouper::new(&schemas.pizzas, &schemas.doughs, &schemas.ingredients);
        Self {
            provider,
            filters: Arc::new(schemas.pizzas.filter_processor(true)),
            grouper: Arc::new(grouper),
            allowed_properties: Arc::new(schemas.pizzas.allowed_properties()),
            schemas: Arc::new(schemas.clone()),
        }
    }

    pub fn filter_processor(&self) -> &FilterProcessor {
        &self.filters
    }

    fn select_statement(&self, includes: PizzaIncludes, where_clause: &str) -> String {
        let mut columns = self.schemas.pizzas.prefixed_select_list();
        let mut joins = String::new();
        let mut order = String::from("PIZZAS.ID");

        if includes.dough {
            columns.extend(self.schemas.doughs.prefixed_select_list());
            joins.push_str(JOIN_DOUGHS);
        }
        if includes.ingredients {
            columns.extend(self.schemas.ingredients.prefixed_select_list());
            joins.push_str(JOIN_INGREDIENTS);
            order.push_str(", INGREDIENTS.ID");
        }

        format!(
            "SELECT {} FROM PIZZAS{joins}{where_clause} ORDER BY {order}",
            columns.join(", ")
        )
    }

    /// Lists pizzas matching the declared filters in `filters`.
    #[instrument(skip(self, filters))]
    pub async fn get_pizzas(
        &self,
        filters: &IndexMap<String, SqlValue>,
        includes: PizzaIncludes,
    ) -> Result<Vec<RawPizza>, StorageError> {
        let processed = self.filters.process_get_filters(filters);
        let sql = self.select_statement(includes, &processed.where_clause());

        let mut conn = self.provider.acquire().await?;
        let result = conn.execute(&sql, &processed.bind_params).await?;
        let pizzas = self.grouper.normalize_join_rows(&result.rows);
        debug!(rows = result.rows.len(), pizzas = pizzas.len(), "Fetched pizzas");
        Ok(pizzas)
    }

    /// Fetches one pizza; `None` when no row has this id.
    #[instrument(skip(self))]
    pub async fn get_pizza_by_id(&self, id: &str, includes: PizzaIncludes) -> Result<Option<RawPizza>, StorageError> {
        let Some(numeric_id) = parse_id(id) else {
            return Ok(None);
        };
        let sql = self.select_statement(includes, " WHERE PIZZAS.ID = :id");
        let binds = BindParams::new().with("id", numeric_id);

        let mut conn = self.provider.acquire().await?;
        let result = conn.execute(&sql, &binds).await?;
        let mut pizzas = self.grouper.normalize_join_rows(&result.rows);
        match pizzas.len() {
            0 => Ok(None),
            1 => Ok(pizzas.pop()),
            n => Err(StorageError::consistency(format!(
                "Expected one pizza with id {id}, found {n}"
            ))),
        }
    }

    /// Input binds for a write: body attributes plus `doughId` when the body
    /// sets the dough relationship.
    fn write_binds(&self, body: &ResourceDocument, writes: &RelationshipWrites) -> Result<BindParams, StorageError> {
        let mut binds = get_bind_params(body, &self.allowed_properties, &self.schemas.pizzas.out_bind_params())?;
        if let Some(dough) = writes.dough {
            binds.insert_in("doughId", dough);
        }
        Ok(binds)
    }

    /// Inserts a pizza and its ingredient links.
    ///
    /// Ingredient ids are checked before anything is written; a missing one
    /// fails the request with no INSERT executed.
    #[instrument(skip(self, body))]
    pub async fn post_pizza(&self, body: &ResourceDocument) -> Result<RawPizza, StorageError> {
        let writes = RelationshipWrites::from_body(body)?;
        let binds = self.write_binds(body, &writes)?;
        let sql = insert_statement(&self.schemas.pizzas, &binds)?;

        let result = if writes.ingredient_ids().is_empty() {
            let mut conn = self.provider.acquire().await?;
            self.insert_pizza(conn.as_mut(), &sql, &binds, &writes).await
        } else {
            let mut tx = self.provider.begin().await?;
            match self.insert_pizza(tx.as_mut(), &sql, &binds, &writes).await {
                Ok(created) => {
                    tx.commit().await?;
                    Ok(created)
                }
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "Rollback after failed pizza insert failed");
                    }
                    Err(err)
                }
            }
        };
        let created = result.map_err(|err| writes.translate(err))?;

        debug!(id = ?created.get("id"), "Created pizza");
        Ok(RawPizza::flat(created))
    }

    async fn insert_pizza<E>(
        &self,
        executor: &mut E,
        sql: &str,
        binds: &BindParams,
        writes: &RelationshipWrites,
    ) -> Result<RawResource, StorageError>
    where
        E: SqlExecutor + ?Sized,
    {
        let ingredient_ids = writes.ingredient_ids();
        ensure_ingredients_exist(executor, ingredient_ids).await?;

        let result = executor.execute(sql, binds).await?;
        if returned_rows(&result.out_binds) != 1 {
            return Err(StorageError::consistency(format!(
                "INSERT into PIZZAS returned {} rows",
                returned_rows(&result.out_binds)
            )));
        }
        let created = convert_out_binds_to_raw_resource(&result.out_binds);

        if !ingredient_ids.is_empty() {
            let pizza_id = returned_pizza_id(&created)?;
            insert_pizza_ingredients(executor, pizza_id, ingredient_ids).await?;
        }
        Ok(created)
    }

    /// Applies the body to the pizza named by `data.id`.
    ///
    /// A body with neither attributes nor relationships is a plain read.
    /// An `ingredients` relationship replaces every ingredient link of the
    /// pizza. Returns `None` when no row has this id.
    #[instrument(skip(self, body), fields(id = ?body.id()))]
    pub async fn update_pizza_by_id(&self, body: &ResourceDocument) -> Result<Option<RawPizza>, StorageError> {
        let id = body
            .id()
            .ok_or_else(|| StorageError::internal("PATCH body without data.id"))?;
        if body.attributes().is_empty() && !body.has_relationships() {
            return self.get_pizza_by_id(id, PizzaIncludes::NONE).await;
        }
        let Some(numeric_id) = parse_id(id) else {
            return Ok(None);
        };

        let writes = RelationshipWrites::from_body(body)?;
        let mut binds = self.write_binds(body, &writes)?;
        let sql = update_statement(&self.schemas.pizzas, &binds)?;
        binds.insert_in("id", numeric_id);

        let result = if writes.ingredients.is_none() {
            let mut conn = self.provider.acquire().await?;
            self.update_pizza(conn.as_mut(), &sql, &binds, numeric_id, &writes).await
        } else {
            let mut tx = self.provider.begin().await?;
            match self.update_pizza(tx.as_mut(), &sql, &binds, numeric_id, &writes).await {
                Ok(Some(updated)) => {
                    tx.commit().await?;
                    Ok(Some(updated))
                }
                other => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "Rollback after failed pizza update failed");
                    }
                    other
                }
            }
        };
        let updated = result.map_err(|err| writes.translate(err))?;

        Ok(updated.map(RawPizza::flat))
    }

    async fn update_pizza<E>(
        &self,
        executor: &mut E,
        sql: &str,
        binds: &BindParams,
        id: i64,
        writes: &RelationshipWrites,
    ) -> Result<Option<RawResource>, StorageError>
    where
        E: SqlExecutor + ?Sized,
    {
        ensure_ingredients_exist(executor, writes.ingredient_ids()).await?;

        let result = executor.execute(sql, binds).await?;
        match returned_rows(&result.out_binds) {
            0 => return Ok(None),
            1 => {}
            n => {
                return Err(StorageError::consistency(format!(
                    "UPDATE of pizza {id} touched {n} rows"
                )));
            }
        }
        let updated = convert_out_binds_to_raw_resource(&result.out_binds);
        ensure_returned_id(&updated, "pizza", id)?;

        if let Some(ingredient_ids) = writes.ingredients.as_deref() {
            let pizza_id = returned_pizza_id(&updated)?;
            let delete = BindParams::new().with("pizzaId", pizza_id);
            let removed = executor
                .execute("DELETE FROM PIZZA_INGREDIENTS WHERE PIZZA_ID = :pizzaId", &delete)
                .await?;
            debug!(removed = removed.rows_affected, "Cleared ingredient links");
            insert_pizza_ingredients(executor, pizza_id, ingredient_ids).await?;
        }
        Ok(Some(updated))
    }
}

impl std::fmt::Debug for PizzaDao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PizzaDao")
            .field("backend", &self.provider.backend_name())
            .finish()
    }
}

async fn ensure_ingredients_exist<E>(executor: &mut E, ids: &[i64]) -> Result<(), StorageError>
where
    E: SqlExecutor + ?Sized,
{
    if check_ingredients_exist(executor, ids).await? {
        Ok(())
    } else {
        Err(StorageError::relation_not_found(
            "ingredients",
            ids.iter().map(i64::to_string),
        ))
    }
}

fn returned_pizza_id(raw: &RawResource) -> Result<i64, StorageError> {
    raw.get("id")
        .and_then(SqlValue::as_i64)
        .ok_or_else(|| StorageError::consistency("Pizza write returned no id"))
}

/// `INSERT INTO PIZZA_INGREDIENTS (PIZZA_ID, INGREDIENT_ID) VALUES (:pizzaId, :ingredientId0), …`
async fn insert_pizza_ingredients<E>(executor: &mut E, pizza_id: i64, ingredient_ids: &[i64]) -> Result<(), StorageError>
where
    E: SqlExecutor + ?Sized,
{
    if ingredient_ids.is_empty() {
        return Ok(());
    }
    let mut binds = BindParams::new().with("pizzaId", pizza_id);
    let values: Vec<String> = ingredient_ids
        .iter()
        .enumerate()
        .map(|(index, ingredient_id)| {
            binds.insert_in(format!("ingredientId{index}"), *ingredient_id);
            format!("(:pizzaId, :ingredientId{index})")
        })
        .collect();
    let sql = format!(
        "INSERT INTO PIZZA_INGREDIENTS (PIZZA_ID, INGREDIENT_ID) VALUES {}",
        values.join(", ")
    );
    let result = executor.execute(&sql, &binds).await?;
    debug!(pizza_id, linked = result.rows_affected, "Linked ingredients");
    Ok(())
}
