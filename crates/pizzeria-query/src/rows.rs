//! Extraction of prefixed resources from joined rows and grouping of
//! one-to-many join results.

use crate::schema::ResourceSchema;
use crate::value::{RawResource, Row, SqlValue};

/// Extracts the resource stored under `<PREFIX>_<attribute>` keys of a row.
///
/// Returns `None` when the identifier column is NULL or missing, which is how
/// a LEFT JOIN reports "no related row". Otherwise the result holds exactly
/// one entry per declared attribute; keys missing from the row read as NULL.
pub fn extract_raw_resource(prefix: &str, attribute_names: &[&str], row: &Row) -> Option<RawResource> {
    let id = row.get(&format!("{prefix}_id"))?;
    if id.is_null() {
        return None;
    }
    Some(
        attribute_names
            .iter()
            .map(|name| {
                let value = row
                    .get(&format!("{prefix}_{name}"))
                    .cloned()
                    .unwrap_or(SqlValue::Null);
                (name.to_string(), value)
            })
            .collect(),
    )
}

/// A pizza read from a joined select.
///
/// `dough` and `ingredients` are `None` when they were not requested. A
/// requested dough that is unset reads as an empty map; requested ingredients
/// with no join rows read as an empty list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPizza {
    pub attributes: RawResource,
    pub dough: Option<RawResource>,
    pub ingredients: Option<Vec<RawResource>>,
}

impl RawPizza {
    /// A pizza without embedded relations.
    pub fn flat(attributes: RawResource) -> Self {
        Self {
            attributes,
            dough: None,
            ingredients: None,
        }
    }

    pub fn id(&self) -> Option<&SqlValue> {
        self.attributes.get("id")
    }
}

/// Groups joined pizza rows into [`RawPizza`] records.
#[derive(Debug, Clone)]
pub struct JoinRowGrouper {
    pizza_prefix: &'static str,
    pizza_attributes: Vec<&'static str>,
    dough_prefix: &'static str,
    dough_attributes: Vec<&'static str>,
    ingredient_prefix: &'static str,
    ingredient_attributes: Vec<&'static str>,
}

impl JoinRowGrouper {
    pub fn new(pizzas: &ResourceSchema, doughs: &ResourceSchema, ingredients: &ResourceSchema) -> Self {
        Self {
            pizza_prefix: pizzas.prefix,
            pizza_attributes: pizzas.attribute_names(),
            dough_prefix: doughs.prefix,
            dough_attributes: doughs.attribute_names(),
            ingredient_prefix: ingredients.prefix,
            ingredient_attributes: ingredients.attribute_names(),
        }
    }

    /// Groups rows into one record per pizza, in row order.
    ///
    /// Which relations are present is decided from the first row's keys. Rows
    /// belonging to the same pizza must be contiguous; a run of rows sharing
    /// the pizza id collects that pizza's ingredients.
    pub fn normalize_join_rows(&self, rows: &[Row]) -> Vec<RawPizza> {
        let Some(first) = rows.first() else {
            return Vec::new();
        };
        let has_dough = first.contains_key(&format!("{}_id", self.dough_prefix));
        let has_ingredients = first.contains_key(&format!("{}_id", self.ingredient_prefix));
        let pizza_id_key = format!("{}_id", self.pizza_prefix);

        let mut pizzas = Vec::new();
        let mut index = 0;
        while index < rows.len() {
            let row = &rows[index];
            let attributes = self.extract(self.pizza_prefix, &self.pizza_attributes, row);

            let dough = has_dough.then(|| self.extract(self.dough_prefix, &self.dough_attributes, row));

            let ingredients = if has_ingredients {
                let pizza_id = row.get(&pizza_id_key);
                let mut ingredients = Vec::new();
                while index < rows.len() && rows[index].get(&pizza_id_key) == pizza_id {
                    if let Some(ingredient) =
                        extract_raw_resource(self.ingredient_prefix, &self.ingredient_attributes, &rows[index])
                    {
                        ingredients.push(ingredient);
                    }
                    index += 1;
                }
                Some(ingredients)
            } else {
                index += 1;
                None
            };

            pizzas.push(RawPizza {
                attributes,
                dough,
                ingredients,
            });
        }
        pizzas
    }

    fn extract(&self, prefix: &str, attributes: &[&str], row: &Row) -> RawResource {
        extract_raw_resource(prefix, attributes, row).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schemas;

    fn row(pairs: &[(&str, SqlValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn grouper() -> JoinRowGrouper {
        let schemas = Schemas::default();
        JoinRowGrouper::new(&schemas.pizzas, &schemas.doughs, &schemas.ingredients)
    }

    fn joined_row(pizza_id: i64, dough_id: Option<i64>, ingredient_id: Option<i64>) -> Row {
        row(&[
            ("PIZZA_id", SqlValue::Integer(pizza_id)),
            ("PIZZA_name", SqlValue::from("Margherita")),
            ("DOUGH_id", dough_id.into()),
            ("DOUGH_name", dough_id.map(|_| "Neapolitan").into()),
            ("INGREDIENT_id", ingredient_id.into()),
            ("INGREDIENT_name", ingredient_id.map(|i| format!("ingredient {i}")).into()),
        ])
    }

    #[test]
    fn test_extract_null_id_is_absent() {
        let r = row(&[("DOUGH_id", SqlValue::Null), ("DOUGH_name", SqlValue::Null)]);
        assert_eq!(extract_raw_resource("DOUGH", &["id", "name"], &r), None);
        assert_eq!(extract_raw_resource("INGREDIENT", &["id"], &r), None);
    }

    #[test]
    fn test_extract_has_exactly_declared_keys() {
        let r = row(&[
            ("DOUGH_id", SqlValue::Integer(1)),
            ("DOUGH_name", SqlValue::from("Tonda")),
            ("DOUGH_extra", SqlValue::from("ignored")),
        ]);
        let dough = extract_raw_resource("DOUGH", &["id", "name", "proofTime"], &r).expect("present");
        let keys: Vec<&str> = dough.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "name", "proofTime"]);
        assert_eq!(dough.get("proofTime"), Some(&SqlValue::Null));
    }

    #[test]
    fn test_no_rows() {
        assert!(grouper().normalize_join_rows(&[]).is_empty());
    }

    #[test]
    fn test_one_pizza_with_dough_and_two_ingredients() {
        let rows = vec![
            joined_row(1, Some(3), Some(7)),
            joined_row(1, Some(3), Some(8)),
        ];
        let pizzas = grouper().normalize_join_rows(&rows);
        assert_eq!(pizzas.len(), 1);

        let pizza = &pizzas[0];
        assert_eq!(pizza.id(), Some(&SqlValue::Integer(1)));
        let dough = pizza.dough.as_ref().expect("dough requested");
        assert_eq!(dough.get("name"), Some(&SqlValue::from("Neapolitan")));
        let ingredients = pizza.ingredients.as_ref().expect("ingredients requested");
        assert_eq!(ingredients.len(), 2);
        assert_eq!(ingredients[1].get("id"), Some(&SqlValue::Integer(8)));
    }

    #[test]
    fn test_null_relations_become_empty() {
        let pizzas = grouper().normalize_join_rows(&[joined_row(1, None, None)]);
        assert_eq!(pizzas.len(), 1);
        assert_eq!(pizzas[0].dough, Some(RawResource::new()));
        assert_eq!(pizzas[0].ingredients, Some(Vec::new()));
    }

    #[test]
    fn test_groups_follow_row_order() {
        let rows = vec![
            joined_row(2, None, Some(7)),
            joined_row(2, None, Some(9)),
            joined_row(1, Some(3), None),
            joined_row(4, None, Some(7)),
        ];
        let pizzas = grouper().normalize_join_rows(&rows);
        let ids: Vec<Option<i64>> = pizzas
            .iter()
            .map(|p| p.id().and_then(SqlValue::as_i64))
            .collect();
        assert_eq!(ids, vec![Some(2), Some(1), Some(4)]);
        assert_eq!(pizzas[0].ingredients.as_ref().map(Vec::len), Some(2));
        assert_eq!(pizzas[1].ingredients.as_ref().map(Vec::len), Some(0));
    }

    #[test]
    fn test_rows_without_relations_map_flat() {
        let rows = vec![
            row(&[("PIZZA_id", SqlValue::Integer(1)), ("PIZZA_name", SqlValue::from("a"))]),
            row(&[("PIZZA_id", SqlValue::Integer(2)), ("PIZZA_name", SqlValue::from("b"))]),
        ];
        let pizzas = grouper().normalize_join_rows(&rows);
        assert_eq!(pizzas.len(), 2);
        assert!(pizzas.iter().all(|p| p.dough.is_none() && p.ingredients.is_none()));
        assert_eq!(pizzas[1].attributes.get("name"), Some(&SqlValue::from("b")));
    }
}
