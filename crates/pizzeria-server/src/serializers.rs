//! Raw records to JSON:API documents.
//!
//! Records come back from the DAOs as flat maps of SQL values. Serializing
//! keeps the public attributes only, coerces integer columns to JSON numbers
//! (drivers may hand them back as text), and renders unset nullable text as
//! `""`.

use std::sync::Arc;

use indexmap::IndexMap;
use pizzeria_api::{
    ApiError, Document, Linkage, Links, Relationship, ResourceLinkage, ResourceObject, params_link,
    resource_path_link,
};
use pizzeria_query::{AttributeDef, AttributeKind, RawPizza, RawResource, ResourceSchema, Schemas, SqlValue};
use serde_json::Value;

const DOUGH: &str = "dough";
const INGREDIENTS: &str = "ingredients";

/// Builds documents with links rooted at `base_url` (public URL plus base path).
#[derive(Debug, Clone)]
pub struct Serializer {
    schemas: Arc<Schemas>,
    base_url: String,
}

impl Serializer {
    pub fn new(schemas: Arc<Schemas>, base_url: impl Into<String>) -> Self {
        Self {
            schemas,
            base_url: base_url.into(),
        }
    }

    pub fn schemas(&self) -> &Schemas {
        &self.schemas
    }

    /// `…/<path>`, followed by the request's query parameters.
    pub fn collection_link(&self, schema: &ResourceSchema, query: &[(String, String)]) -> String {
        params_link(&resource_path_link(&self.base_url, &[schema.path]), query)
    }

    pub fn resource_link(&self, schema: &ResourceSchema, id: &str) -> String {
        resource_path_link(&self.base_url, &[schema.path, id])
    }

    pub fn resource_object(&self, schema: &ResourceSchema, raw: &RawResource) -> Result<ResourceObject, ApiError> {
        let id = record_id(schema, raw)?;
        let attributes = schema
            .public_attributes()
            .filter(|attr| !attr.is_id())
            .map(|attr| (attr.name.to_string(), attribute_value(attr, raw.get(attr.name))))
            .collect();
        Ok(ResourceObject {
            resource_type: schema.resource_type.to_string(),
            links: Links::self_only(self.resource_link(schema, &id)),
            id,
            attributes,
            relationships: IndexMap::new(),
        })
    }

    pub fn document(&self, schema: &ResourceSchema, raw: &RawResource) -> Result<Document, ApiError> {
        let resource = self.resource_object(schema, raw)?;
        let self_link = resource.links.self_link.clone();
        Ok(Document::single(resource, self_link))
    }

    pub fn collection(
        &self,
        schema: &ResourceSchema,
        raws: &[RawResource],
        query: &[(String, String)],
    ) -> Result<Document, ApiError> {
        let resources = raws
            .iter()
            .map(|raw| self.resource_object(schema, raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Document::collection(resources, self.collection_link(schema, query)))
    }

    /// A pizza resource plus the resources it embeds.
    ///
    /// The dough linkage always reflects `doughId`. Ingredient linkage is only
    /// known when ingredients were included, so `data` is left out otherwise.
    fn pizza_object(&self, pizza: &RawPizza) -> Result<(ResourceObject, Vec<ResourceObject>), ApiError> {
        let schemas = &self.schemas;
        let mut resource = self.resource_object(&schemas.pizzas, &pizza.attributes)?;
        let pizza_link = resource.links.self_link.clone();
        let mut included = Vec::new();

        let dough_linkage = pizza
            .attributes
            .get("doughId")
            .and_then(SqlValue::as_i64)
            .map(|id| ResourceLinkage::new(schemas.doughs.resource_type, id.to_string()));
        if let Some(dough) = pizza.dough.as_ref().filter(|dough| !dough.is_empty()) {
            included.push(self.resource_object(&schemas.doughs, dough)?);
        }
        resource.relationships.insert(
            DOUGH.to_string(),
            Relationship {
                data: Some(Linkage::One(dough_linkage)),
                links: relationship_links(&pizza_link, DOUGH),
            },
        );

        let ingredient_linkage = match &pizza.ingredients {
            Some(ingredients) => {
                let mut linkage = Vec::with_capacity(ingredients.len());
                for ingredient in ingredients {
                    let object = self.resource_object(&schemas.ingredients, ingredient)?;
                    linkage.push(object.linkage());
                    included.push(object);
                }
                Some(Linkage::Many(linkage))
            }
            None => None,
        };
        resource.relationships.insert(
            INGREDIENTS.to_string(),
            Relationship {
                data: ingredient_linkage,
                links: relationship_links(&pizza_link, INGREDIENTS),
            },
        );

        Ok((resource, included))
    }

    pub fn pizza_document(&self, pizza: &RawPizza) -> Result<Document, ApiError> {
        let (resource, included) = self.pizza_object(pizza)?;
        let self_link = resource.links.self_link.clone();
        Ok(Document::single(resource, self_link).with_included(included))
    }

    pub fn pizza_collection(&self, pizzas: &[RawPizza], query: &[(String, String)]) -> Result<Document, ApiError> {
        let mut resources = Vec::with_capacity(pizzas.len());
        let mut included = Vec::new();
        for pizza in pizzas {
            let (resource, embedded) = self.pizza_object(pizza)?;
            resources.push(resource);
            included.extend(embedded);
        }
        let self_link = self.collection_link(&self.schemas.pizzas, query);
        Ok(Document::collection(resources, self_link).with_included(included))
    }
}

fn relationship_links(resource_link: &str, relationship: &str) -> Links {
    Links::with_related(
        resource_path_link(resource_link, &["relationships", relationship]),
        resource_path_link(resource_link, &[relationship]),
    )
}

fn record_id(schema: &ResourceSchema, raw: &RawResource) -> Result<String, ApiError> {
    match raw.get("id") {
        Some(SqlValue::Integer(id)) => Ok(id.to_string()),
        Some(value) if !value.is_null() => Ok(value.as_display_str()),
        _ => {
            tracing::error!(resource = schema.resource_type, "Record without id");
            Err(ApiError::internal("An unexpected error occurred"))
        }
    }
}

fn attribute_value(attr: &AttributeDef, value: Option<&SqlValue>) -> Value {
    match value.filter(|v| !v.is_null()) {
        None if attr.nullable && attr.kind == AttributeKind::Text => Value::String(String::new()),
        None => Value::Null,
        Some(value) => match attr.kind {
            AttributeKind::Integer => value.as_i64().map_or_else(|| value.to_json(), Value::from),
            AttributeKind::Text => match value {
                SqlValue::Text(text) => Value::String(text.clone()),
                other => Value::String(other.as_display_str()),
            },
        },
    }
}
