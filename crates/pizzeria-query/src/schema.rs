//! Resource schemas.
//!
//! Each resource (dough, ingredient, pizza) is described once: its JSON:API
//! type, URL path, table, the alias prefix used in joined selects, its
//! attributes with their physical columns, the GET parameters it declares and
//! the relationships it exposes. Everything that generates SQL or validates
//! request bodies reads from these descriptions.

use indexmap::{IndexMap, IndexSet};

use crate::error::QueryError;
use crate::filter::FilterProcessor;
use crate::value::{BindParams, OutType, SqlValue};

/// Value kind of an attribute or filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Text,
    Integer,
}

impl AttributeKind {
    /// Logical type used when the attribute is returned through an out-bind.
    pub fn out_type(self) -> OutType {
        match self {
            Self::Text => OutType::String,
            Self::Integer => OutType::Number,
        }
    }

    /// Parses a raw query-string value.
    pub fn parse(self, raw: &str) -> Option<SqlValue> {
        match self {
            Self::Text => Some(SqlValue::Text(raw.to_string())),
            Self::Integer => raw.trim().parse::<i64>().ok().map(SqlValue::Integer),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Integer => "integer",
        }
    }
}

/// A single attribute of a resource and the column backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDef {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: AttributeKind,
    pub nullable: bool,
    /// Accepted in `data.attributes` of POST/PATCH bodies.
    pub writable: bool,
    /// Emitted in serialized `attributes`.
    pub public: bool,
}

impl AttributeDef {
    pub const fn text(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            column,
            kind: AttributeKind::Text,
            nullable: false,
            writable: true,
            public: true,
        }
    }

    pub const fn integer(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            column,
            kind: AttributeKind::Integer,
            nullable: false,
            writable: true,
            public: true,
        }
    }

    /// The identity column. Minted by the database, never written by clients.
    pub const fn id() -> Self {
        Self {
            name: "id",
            column: "ID",
            kind: AttributeKind::Integer,
            nullable: false,
            writable: false,
            public: false,
        }
    }

    #[must_use]
    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    /// Backs a relationship rather than an attribute: stored and read back,
    /// but neither accepted nor emitted as a JSON:API attribute.
    #[must_use]
    pub const fn hidden(self) -> Self {
        Self {
            writable: false,
            public: false,
            ..self
        }
    }

    pub fn is_id(&self) -> bool {
        self.name == "id"
    }

    /// Out-bind name for this attribute (`name` -> `nameOut`).
    pub fn out_bind_name(&self) -> String {
        format!("{}Out", self.name)
    }
}

/// A query parameter declared for a collection endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetParameter {
    /// Raw parameter name, possibly wrapped as `filter[x]`.
    pub name: &'static str,
    pub kind: AttributeKind,
}

impl GetParameter {
    pub const fn filter(name: &'static str, kind: AttributeKind) -> Self {
        Self { name, kind }
    }
}

/// A relationship exposed by a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDef {
    pub name: &'static str,
    /// JSON:API type of the related resource.
    pub resource_type: &'static str,
    pub to_many: bool,
}

/// Immutable description of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSchema {
    /// JSON:API type, singular (`dough`).
    pub resource_type: &'static str,
    /// URL path segment, plural (`doughs`).
    pub path: &'static str,
    pub table: &'static str,
    /// Alias prefix for joined selects (`DOUGH_name`).
    pub prefix: &'static str,
    /// Attributes in declaration order, identity first.
    pub attributes: Vec<AttributeDef>,
    pub get_parameters: Vec<GetParameter>,
    pub relationships: Vec<RelationshipDef>,
}

impl ResourceSchema {
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Parses an `include=a,b` value into relationship names.
    ///
    /// Empty entries are skipped and repeats collapse; an entry that is not a
    /// relationship of this resource is rejected.
    pub fn parse_includes(&self, raw: &str) -> Result<Vec<&'static str>, QueryError> {
        let mut included: Vec<&'static str> = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let def = self
                .relationship(entry)
                .ok_or_else(|| QueryError::UnknownInclude(entry.to_string()))?;
            if !included.contains(&def.name) {
                included.push(def.name);
            }
        }
        Ok(included)
    }

    /// Every attribute name including `id`, in declaration order.
    pub fn attribute_names(&self) -> Vec<&'static str> {
        self.attributes.iter().map(|a| a.name).collect()
    }

    /// Attribute names a client may set through `data.attributes`.
    pub fn allowed_properties(&self) -> IndexSet<&'static str> {
        self.attributes
            .iter()
            .filter(|a| a.writable)
            .map(|a| a.name)
            .collect()
    }

    /// Attributes emitted in serialized documents.
    pub fn public_attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.iter().filter(|a| a.public)
    }

    /// Attribute name -> column, optionally qualified with the table name.
    pub fn column_map(&self, qualified: bool) -> IndexMap<String, String> {
        self.attributes
            .iter()
            .map(|a| (a.name.to_string(), self.column_expr(a.column, qualified)))
            .collect()
    }

    fn column_expr(&self, column: &str, qualified: bool) -> String {
        if qualified {
            format!("{}.{}", self.table, column)
        } else {
            column.to_string()
        }
    }

    /// Builds the filter processor for this resource's collection endpoint.
    pub fn filter_processor(&self, qualified: bool) -> FilterProcessor {
        FilterProcessor::new(&self.get_parameters, self.column_map(qualified))
    }

    /// `ID AS "id", NAME AS "name", …`
    pub fn select_list(&self) -> String {
        self.attributes
            .iter()
            .map(|a| format!("{} AS \"{}\"", a.column, a.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `PIZZAS.ID AS "PIZZA_id", …`
    pub fn prefixed_select_list(&self) -> Vec<String> {
        self.attributes
            .iter()
            .map(|a| {
                format!(
                    "{}.{} AS \"{}_{}\"",
                    self.table, a.column, self.prefix, a.name
                )
            })
            .collect()
    }

    /// Out-bind declarations for write statements: `idOut` first, then one
    /// per stored attribute.
    pub fn out_bind_params(&self) -> BindParams {
        let mut params = BindParams::new();
        params.insert_out("idOut", OutType::String);
        for attr in self.attributes.iter().filter(|a| !a.is_id()) {
            params.insert_out(attr.out_bind_name(), attr.kind.out_type());
        }
        params
    }

    /// `RETURNING ID AS "idOut", NAME AS "nameOut", …`
    pub fn returning_clause(&self) -> String {
        let columns = self
            .attributes
            .iter()
            .map(|a| format!("{} AS \"{}\"", a.column, a.out_bind_name()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("RETURNING {columns}")
    }
}

/// The three resource schemas, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schemas {
    pub doughs: ResourceSchema,
    pub ingredients: ResourceSchema,
    pub pizzas: ResourceSchema,
}

impl Default for Schemas {
    fn default() -> Self {
        Self {
            doughs: dough_schema(),
            ingredients: ingredient_schema(),
            pizzas: pizza_schema(),
        }
    }
}

fn dough_schema() -> ResourceSchema {
    ResourceSchema {
        resource_type: "dough",
        path: "doughs",
        table: "DOUGHS",
        prefix: "DOUGH",
        attributes: vec![
            AttributeDef::id(),
            AttributeDef::text("name", "NAME"),
            AttributeDef::integer("gramsFlour", "GRAMS_FLOUR"),
            AttributeDef::integer("gramsWater", "GRAMS_WATER"),
            AttributeDef::text("flourType", "FLOUR_TYPE"),
            AttributeDef::integer("waterTemp", "WATER_TEMP"),
            AttributeDef::integer("gramsYeast", "GRAMS_YEAST"),
            AttributeDef::integer("gramsSalt", "GRAMS_SALT"),
            AttributeDef::integer("gramsSugar", "GRAMS_SUGAR"),
            AttributeDef::integer("gramsOliveOil", "GRAMS_OLIVE_OIL"),
            AttributeDef::integer("bulkFermentTime", "BULK_FERMENT_TIME"),
            AttributeDef::integer("proofTime", "PROOF_TIME"),
            AttributeDef::text("specialInstructions", "SPECIAL_INSTRUCTIONS").nullable(),
        ],
        get_parameters: vec![
            GetParameter::filter("filter[name]", AttributeKind::Text),
            GetParameter::filter("filter[gramsWater]", AttributeKind::Integer),
            GetParameter::filter("filter[proofTime]", AttributeKind::Integer),
            GetParameter::filter("filter[waterTemp]", AttributeKind::Integer),
            GetParameter::filter("filter[flourType]", AttributeKind::Text),
        ],
        relationships: Vec::new(),
    }
}

fn ingredient_schema() -> ResourceSchema {
    ResourceSchema {
        resource_type: "ingredient",
        path: "ingredients",
        table: "INGREDIENTS",
        prefix: "INGREDIENT",
        attributes: vec![
            AttributeDef::id(),
            AttributeDef::text("ingredientType", "TYPE"),
            AttributeDef::text("name", "NAME"),
            AttributeDef::text("notes", "NOTES").nullable(),
        ],
        get_parameters: vec![
            GetParameter::filter("filter[name]", AttributeKind::Text),
            GetParameter::filter("filter[ingredientType]", AttributeKind::Text),
        ],
        relationships: Vec::new(),
    }
}

fn pizza_schema() -> ResourceSchema {
    ResourceSchema {
        resource_type: "pizza",
        path: "pizzas",
        table: "PIZZAS",
        prefix: "PIZZA",
        attributes: vec![
            AttributeDef::id(),
            AttributeDef::integer("doughId", "DOUGH_ID").nullable().hidden(),
            AttributeDef::text("name", "NAME"),
            AttributeDef::integer("bakeTime", "BAKE_TIME"),
            AttributeDef::integer("ovenTemp", "OVEN_TEMP"),
            AttributeDef::text("specialInstructions", "SPECIAL_INSTRUCTIONS").nullable(),
        ],
        get_parameters: vec![
            GetParameter::filter("filter[name]", AttributeKind::Text),
            GetParameter::filter("filter[bakeTime]", AttributeKind::Integer),
            GetParameter::filter("filter[ovenTemp]", AttributeKind::Integer),
        ],
        relationships: vec![
            RelationshipDef {
                name: "dough",
                resource_type: "dough",
                to_many: false,
            },
            RelationshipDef {
                name: "ingredients",
                resource_type: "ingredient",
                to_many: true,
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::BindValue;

    #[test]
    fn test_out_bind_params_start_with_id() {
        let schemas = Schemas::default();
        let params = schemas.ingredients.out_bind_params();
        let names: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(
            names,
            vec!["idOut", "ingredientTypeOut", "nameOut", "notesOut"]
        );
        assert_eq!(params.get("idOut"), Some(&BindValue::Out(OutType::String)));
    }

    #[test]
    fn test_pizza_out_binds_cover_hidden_dough_id() {
        let schemas = Schemas::default();
        let params = schemas.pizzas.out_bind_params();
        assert_eq!(
            params.get("doughIdOut"),
            Some(&BindValue::Out(OutType::Number))
        );
        assert!(!schemas.pizzas.allowed_properties().contains("doughId"));
    }

    #[test]
    fn test_select_lists() {
        let schemas = Schemas::default();
        assert_eq!(
            schemas.ingredients.select_list(),
            r#"ID AS "id", TYPE AS "ingredientType", NAME AS "name", NOTES AS "notes""#
        );
        assert_eq!(
            schemas.pizzas.prefixed_select_list()[0],
            r#"PIZZAS.ID AS "PIZZA_id""#
        );
    }

    #[test]
    fn test_returning_clause() {
        let schemas = Schemas::default();
        assert_eq!(
            schemas.ingredients.returning_clause(),
            r#"RETURNING ID AS "idOut", TYPE AS "ingredientTypeOut", NAME AS "nameOut", NOTES AS "notesOut""#
        );
    }

    #[test]
    fn test_allowed_properties_exclude_id() {
        let schemas = Schemas::default();
        let allowed = schemas.doughs.allowed_properties();
        assert!(!allowed.contains("id"));
        assert!(allowed.contains("gramsOliveOil"));
        assert_eq!(allowed.len(), 12);
    }

    #[test]
    fn test_parse_includes() {
        let schemas = Schemas::default();
        assert_eq!(
            schemas.pizzas.parse_includes("ingredients, dough,dough"),
            Ok(vec!["ingredients", "dough"])
        );
        assert_eq!(schemas.pizzas.parse_includes(""), Ok(vec![]));
        assert_eq!(
            schemas.pizzas.parse_includes("crust"),
            Err(QueryError::UnknownInclude("crust".into()))
        );
        assert!(schemas.doughs.parse_includes("dough").is_err());
    }

    #[test]
    fn test_attribute_kind_parse() {
        assert_eq!(
            AttributeKind::Integer.parse("90"),
            Some(SqlValue::Integer(90))
        );
        assert_eq!(AttributeKind::Integer.parse("warm"), None);
        assert_eq!(
            AttributeKind::Text.parse("00"),
            Some(SqlValue::Text("00".into()))
        );
    }
}
