//! JSON:API request documents and their validation.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{QueryError, Result};
use crate::schema::{AttributeKind, ResourceSchema};

/// Body of a POST or PATCH request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    pub data: ResourceData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceData {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub relationships: IndexMap<String, RelationshipDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDocument {
    pub data: RelationshipData,
}

/// Resource linkage: an array for to-many, an identifier or `null` for to-one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    Many(Vec<ResourceIdentifier>),
    One(Option<ResourceIdentifier>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
}

impl ResourceIdentifier {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

/// Identifiers are strings in JSON:API, but integer ids are accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Integer(i64),
}

impl From<RawId> for String {
    fn from(id: RawId) -> Self {
        match id {
            RawId::Text(s) => s,
            RawId::Integer(i) => i.to_string(),
        }
    }
}

fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    RawId::deserialize(deserializer).map(String::from)
}

fn deserialize_optional_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Option::<RawId>::deserialize(deserializer).map(|id| id.map(String::from))
}

impl ResourceDocument {
    pub fn id(&self) -> Option<&str> {
        self.data.id.as_deref()
    }

    pub fn attributes(&self) -> &IndexMap<String, Value> {
        &self.data.attributes
    }

    pub fn has_relationships(&self) -> bool {
        !self.data.relationships.is_empty()
    }

    /// To-one linkage: `None` when the relationship is absent,
    /// `Some(None)` when it is explicitly `null`.
    pub fn to_one(&self, name: &str) -> Option<Option<&ResourceIdentifier>> {
        match self.data.relationships.get(name).map(|r| &r.data) {
            Some(RelationshipData::One(identifier)) => Some(identifier.as_ref()),
            _ => None,
        }
    }

    /// To-many linkage, `None` when the relationship is absent.
    pub fn to_many(&self, name: &str) -> Option<&[ResourceIdentifier]> {
        match self.data.relationships.get(name).map(|r| &r.data) {
            Some(RelationshipData::Many(identifiers)) => Some(identifiers.as_slice()),
            _ => None,
        }
    }

    /// Checks that the document targets `schema` and, for updates, the
    /// resource addressed by the URL.
    pub fn check_target(&self, schema: &ResourceSchema, path_id: Option<&str>) -> Result<()> {
        if self.data.resource_type != schema.resource_type {
            return Err(QueryError::Conflict(format!(
                "Resource type {} does not match endpoint type {}",
                self.data.resource_type, schema.resource_type
            )));
        }
        if let Some(path_id) = path_id {
            match self.id() {
                Some(id) if id == path_id => {}
                Some(id) => {
                    return Err(QueryError::Conflict(format!(
                        "Resource id {id} does not match requested id {path_id}"
                    )));
                }
                None => {
                    return Err(QueryError::MalformedBody(
                        "Body does not include required \"data.id\" value".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Whether a body creates a resource or patches an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    Create,
    Update,
}

/// Validates a raw request body against a resource schema and parses it.
///
/// Rejects bodies without `data` or `data.attributes`, attributes the
/// resource does not accept, values of the wrong kind, missing required
/// attributes on create, unknown or mis-shaped relationships, and to-many
/// linkage with repeated members.
pub fn validate_body(body: &Value, schema: &ResourceSchema, mode: BodyMode) -> Result<ResourceDocument> {
    let data = body
        .get("data")
        .filter(|d| d.is_object())
        .ok_or_else(|| QueryError::MalformedBody("Body does not include required \"data\" value".into()))?;
    if !data.get("attributes").is_some_and(Value::is_object) {
        return Err(QueryError::MalformedBody(
            "Body does not include required \"data.attributes\" value".into(),
        ));
    }

    let document: ResourceDocument = serde_json::from_value(body.clone())
        .map_err(|e| QueryError::MalformedBody(e.to_string()))?;

    validate_attributes(&document, schema, mode)?;
    validate_relationships(&document, schema)?;

    Ok(document)
}

fn validate_attributes(document: &ResourceDocument, schema: &ResourceSchema, mode: BodyMode) -> Result<()> {
    let allowed = schema.allowed_properties();

    for (name, value) in document.attributes() {
        let attr = schema
            .attribute(name)
            .filter(|a| allowed.contains(a.name))
            .ok_or_else(|| QueryError::UnknownAttribute(name.clone()))?;

        let valid = match value {
            Value::Null => attr.nullable,
            Value::String(_) => attr.kind == AttributeKind::Text,
            Value::Number(n) => attr.kind == AttributeKind::Integer && n.is_i64(),
            _ => false,
        };
        if !valid {
            let expected = if attr.nullable {
                format!("{} or null", attr.kind.as_str())
            } else {
                attr.kind.as_str().to_string()
            };
            return Err(QueryError::InvalidBody(format!(
                "Attribute {name} must be {expected}"
            )));
        }
    }

    if mode == BodyMode::Create {
        let missing = schema
            .attributes
            .iter()
            .filter(|a| a.writable && !a.nullable)
            .find(|a| !document.attributes().contains_key(a.name));
        if let Some(attr) = missing {
            return Err(QueryError::InvalidBody(format!(
                "Attribute {} is required",
                attr.name
            )));
        }
    }

    Ok(())
}

fn validate_relationships(document: &ResourceDocument, schema: &ResourceSchema) -> Result<()> {
    for (name, relationship) in &document.data.relationships {
        let def = schema.relationship(name).ok_or_else(|| {
            QueryError::InvalidBody(format!("Relationship {name} is not a valid relationship"))
        })?;

        let identifiers: Vec<&ResourceIdentifier> = match (&relationship.data, def.to_many) {
            (RelationshipData::Many(ids), true) => ids.iter().collect(),
            (RelationshipData::One(id), false) => id.iter().collect(),
            (_, true) => {
                return Err(QueryError::InvalidBody(format!(
                    "Relationship {name} must be an array of resource identifiers"
                )));
            }
            (_, false) => {
                return Err(QueryError::InvalidBody(format!(
                    "Relationship {name} must be a single resource identifier or null"
                )));
            }
        };

        if let Some(wrong) = identifiers.iter().find(|i| i.resource_type != def.resource_type) {
            return Err(QueryError::InvalidBody(format!(
                "Relationship {name} expects type {}, found {}",
                def.resource_type, wrong.resource_type
            )));
        }

        let unique: std::collections::HashSet<&ResourceIdentifier> = identifiers.iter().copied().collect();
        if unique.len() != identifiers.len() {
            return Err(QueryError::InvalidBody(format!(
                "Relationship {name} contains non-unique elements"
            )));
        }
    }
    Ok(())
}
