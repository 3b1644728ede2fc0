//! Bind parameters for write statements and normalization of out-binds.

use std::sync::LazyLock;

use indexmap::IndexSet;

use crate::body::ResourceDocument;
use crate::error::{QueryError, Result};
use crate::value::{BindParams, OutBinds, RawResource, SqlValue};

static OUT_BIND_REGEX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^(.*)Out$").expect("Invalid out-bind regex"));

/// Builds bind parameters from the attributes of a request body.
///
/// Starts from a copy of `base` (typically the declared out-binds) and adds
/// one input bind per attribute. Any attribute outside `allowed_properties`
/// fails the whole call; nothing partially built is returned.
pub fn get_bind_params(
    body: &ResourceDocument,
    allowed_properties: &IndexSet<&'static str>,
    base: &BindParams,
) -> Result<BindParams> {
    let mut params = base.clone();
    for (name, value) in body.attributes() {
        if !allowed_properties.contains(name.as_str()) {
            return Err(QueryError::InvalidAttribute(name.clone()));
        }
        let value = SqlValue::from_json(value).ok_or_else(|| QueryError::InvalidAttribute(name.clone()))?;
        params.insert_in(name.clone(), value);
    }
    Ok(params)
}

/// Recovers the property name from an out-bind name (`nameOut` -> `name`).
///
/// Names without the `Out` suffix are returned unchanged.
pub fn out_bind_param_to_property_name(name: &str) -> &str {
    OUT_BIND_REGEX
        .captures(name)
        .and_then(|caps| caps.get(1))
        .map_or(name, |m| m.as_str())
}

/// Converts out-binds of a single-row write into the shape a flat select
/// row has: `{idOut: [201], nameOut: ["x"]}` -> `{id: 201, name: "x"}`.
pub fn convert_out_binds_to_raw_resource(out_binds: &OutBinds) -> RawResource {
    out_binds
        .iter()
        .map(|(name, values)| {
            let value = values.first().cloned().unwrap_or(SqlValue::Null);
            (out_bind_param_to_property_name(name).to_string(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::ResourceData;
    use crate::schema::Schemas;
    use crate::value::{BindValue, OutType};
    use indexmap::IndexMap;
    use serde_json::json;

    fn document(attributes: serde_json::Value) -> ResourceDocument {
        let attributes: IndexMap<String, serde_json::Value> =
            serde_json::from_value(attributes).expect("attribute object");
        ResourceDocument {
            data: ResourceData {
                resource_type: "dough".into(),
                id: None,
                attributes,
                relationships: IndexMap::new(),
            },
        }
    }

    #[test]
    fn test_disallowed_attribute_errors() {
        let schemas = Schemas::default();
        let allowed = schemas.doughs.allowed_properties();
        let base = schemas.doughs.out_bind_params();

        for attributes in [
            json!({"abc": 1}),
            json!({"name": "Tonda", "abc": 1}),
            json!({"id": 4}),
        ] {
            let body = document(attributes.clone());
            let err = get_bind_params(&body, &allowed, &base).unwrap_err();
            let offending = attributes
                .as_object()
                .and_then(|o| o.keys().find(|k| !allowed.contains(k.as_str())).cloned())
                .expect("an offending key");
            assert_eq!(err, QueryError::InvalidAttribute(offending));
        }
    }

    #[test]
    fn test_empty_attributes_return_base() {
        let schemas = Schemas::default();
        let base = schemas.doughs.out_bind_params();
        let params = get_bind_params(&document(json!({})), &schemas.doughs.allowed_properties(), &base)
            .expect("no attributes");
        assert_eq!(params, base);
    }

    #[test]
    fn test_attributes_are_added_after_base() {
        let schemas = Schemas::default();
        let mut base = BindParams::new();
        base.insert_out("idOut", OutType::String);
        let params = get_bind_params(
            &document(json!({"name": "Tonda", "proofTime": 48})),
            &schemas.doughs.allowed_properties(),
            &base,
        )
        .expect("valid attributes");

        let names: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["idOut", "name", "proofTime"]);
        assert_eq!(
            params.get("proofTime"),
            Some(&BindValue::In(SqlValue::Integer(48)))
        );
        assert!(!params.contains_key("gramsFlour"));
    }

    #[test]
    fn test_out_bind_param_to_property_name() {
        assert_eq!(out_bind_param_to_property_name("idOut"), "id");
        assert_eq!(out_bind_param_to_property_name("gramsFlourOut"), "gramsFlour");
        assert_eq!(out_bind_param_to_property_name("name"), "name");
        assert_eq!(out_bind_param_to_property_name("OutOut"), "Out");
    }

    #[test]
    fn test_convert_out_binds_to_raw_resource() {
        let mut out_binds = OutBinds::new();
        out_binds.insert("idOut".into(), vec![SqlValue::Integer(201)]);
        out_binds.insert("nameOut".into(), vec![SqlValue::from("x")]);

        let raw = convert_out_binds_to_raw_resource(&out_binds);
        let expected: RawResource = [
            ("id".to_string(), SqlValue::Integer(201)),
            ("name".to_string(), SqlValue::from("x")),
        ]
        .into_iter()
        .collect();
        assert_eq!(raw, expected);
    }
}
