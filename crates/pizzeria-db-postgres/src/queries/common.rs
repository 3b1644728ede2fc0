//! Statement builders and result checks shared by the DAOs.

use pizzeria_query::{BindParams, RawResource, ResourceSchema, Row, SqlValue};
use pizzeria_storage::StorageError;

/// Parses a resource id. Ids that are not integers cannot match any row.
pub(crate) fn parse_id(id: &str) -> Option<i64> {
    id.parse::<i64>().ok()
}

/// `(column, bind name)` for every input bind, in bind order.
///
/// An input bind that is not a declared attribute of `schema` is a server
/// error: request validation should have rejected it.
fn assignments(schema: &ResourceSchema, binds: &BindParams) -> Result<Vec<(&'static str, String)>, StorageError> {
    binds
        .in_names()
        .map(|name| {
            schema
                .attribute(name)
                .filter(|a| !a.is_id())
                .map(|a| (a.column, name.to_string()))
                .ok_or_else(|| StorageError::InvalidAttribute {
                    name: name.to_string(),
                })
        })
        .collect()
}

/// `INSERT INTO T (COL, …) VALUES (:name, …) RETURNING …`
pub(crate) fn insert_statement(schema: &ResourceSchema, binds: &BindParams) -> Result<String, StorageError> {
    let assignments = assignments(schema, binds)?;
    if assignments.is_empty() {
        return Ok(format!(
            "INSERT INTO {} DEFAULT VALUES {}",
            schema.table,
            schema.returning_clause()
        ));
    }
    let columns: Vec<&str> = assignments.iter().map(|(column, _)| *column).collect();
    let values: Vec<String> = assignments.iter().map(|(_, name)| format!(":{name}")).collect();
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({}) {}",
        schema.table,
        columns.join(", "),
        values.join(", "),
        schema.returning_clause()
    ))
}

/// `UPDATE T SET COL = :name, … WHERE ID = :id RETURNING …`
///
/// With no column changes the statement sets `ID = ID` so the row is still
/// returned.
pub(crate) fn update_statement(schema: &ResourceSchema, binds: &BindParams) -> Result<String, StorageError> {
    let assignments = assignments(schema, binds)?;
    let set_clause = if assignments.is_empty() {
        "ID = ID".to_string()
    } else {
        assignments
            .iter()
            .map(|(column, name)| format!("{column} = :{name}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    Ok(format!(
        "UPDATE {} SET {} WHERE ID = :id {}",
        schema.table,
        set_clause,
        schema.returning_clause()
    ))
}

/// Returns the only row of a by-id lookup; more than one is an
/// internal consistency error.
pub(crate) fn single_row(mut rows: Vec<Row>, resource_type: &str, id: &str) -> Result<Option<Row>, StorageError> {
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.pop()),
        n => Err(StorageError::consistency(format!(
            "Expected one {resource_type} with id {id}, found {n}"
        ))),
    }
}

/// Checks that a written row carries the id that was requested.
///
/// Ids compare numerically, so a path id of `04` matches a returned `4`.
pub(crate) fn ensure_returned_id(raw: &RawResource, resource_type: &str, expected: i64) -> Result<(), StorageError> {
    let returned = raw.get("id");
    if returned.and_then(SqlValue::as_i64) == Some(expected) {
        Ok(())
    } else {
        Err(StorageError::consistency(format!(
            "Write on {resource_type} {expected} returned id {}",
            returned.map_or_else(|| "none".into(), SqlValue::as_display_str)
        )))
    }
}

/// Number of rows a write returned through its `idOut` out-bind.
pub(crate) fn returned_rows(out_binds: &pizzeria_query::OutBinds) -> usize {
    out_binds.get("idOut").map_or(0, Vec::len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pizzeria_query::Schemas;

    #[test]
    fn test_insert_statement_uses_bind_order() {
        let schemas = Schemas::default();
        let mut binds = schemas.ingredients.out_bind_params();
        binds.insert_in("name", "Basil");
        binds.insert_in("ingredientType", "herb");

        let sql = insert_statement(&schemas.ingredients, &binds).expect("statement");
        assert_eq!(
            sql,
            "INSERT INTO INGREDIENTS (NAME, TYPE) VALUES (:name, :ingredientType) \
             RETURNING ID AS \"idOut\", TYPE AS \"ingredientTypeOut\", NAME AS \"nameOut\", NOTES AS \"notesOut\""
        );
    }

    #[test]
    fn test_update_statement_without_columns() {
        let schemas = Schemas::default();
        let binds = schemas.pizzas.out_bind_params();
        let sql = update_statement(&schemas.pizzas, &binds).expect("statement");
        assert!(sql.starts_with("UPDATE PIZZAS SET ID = ID WHERE ID = :id RETURNING ID AS \"idOut\""));
    }

    #[test]
    fn test_unknown_bind_is_server_error() {
        let schemas = Schemas::default();
        let binds = BindParams::new().with("crust", "thin");
        let err = update_statement(&schemas.pizzas, &binds).unwrap_err();
        assert!(matches!(err, StorageError::InvalidAttribute { ref name } if name == "crust"));
    }

    #[test]
    fn test_single_row() {
        let row: Row = [("id".to_string(), SqlValue::Integer(1))].into_iter().collect();
        assert_eq!(single_row(vec![], "dough", "1").expect("ok"), None);
        assert!(single_row(vec![row.clone()], "dough", "1").expect("ok").is_some());
        assert!(matches!(
            single_row(vec![row.clone(), row], "dough", "1"),
            Err(StorageError::Consistency { .. })
        ));
    }

    #[test]
    fn test_ensure_returned_id() {
        let raw: RawResource = [("id".to_string(), SqlValue::from("4"))].into_iter().collect();
        assert!(ensure_returned_id(&raw, "pizza", 4).is_ok());
        assert!(ensure_returned_id(&raw, "pizza", 5).is_err());
        assert!(ensure_returned_id(&RawResource::new(), "pizza", 4).is_err());
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("12"), Some(12));
        assert_eq!(parse_id("abc"), None);
        assert_eq!(parse_id(""), None);
    }
}
