//! Collection filters: `filter[x]=value` query parameters to SQL conditionals.

use std::sync::LazyLock;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{QueryError, Result};
use crate::schema::{AttributeKind, GetParameter};
use crate::value::{BindParams, SqlValue};

static FILTER_NAME_REGEX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"filter\[(.*)\]").expect("Invalid filter name regex"));

/// Removes the `filter[]` wrapper from a query parameter name.
///
/// Names without the wrapper, or with an empty one, are returned unchanged.
pub fn normalize_filter_name(name: &str) -> String {
    FILTER_NAME_REGEX
        .captures(name)
        .and_then(|caps| caps.get(1))
        .filter(|inner| !inner.as_str().is_empty())
        .map(|inner| inner.as_str().to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Applies [`normalize_filter_name`] to every key. When two raw names
/// normalize to the same key the later one wins.
pub fn normalize_filter_names<V: Clone>(filters: &IndexMap<String, V>) -> IndexMap<String, V> {
    filters
        .iter()
        .map(|(name, value)| (normalize_filter_name(name), value.clone()))
        .collect()
}

/// Result of [`FilterProcessor::process_get_filters`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedFilters {
    pub bind_params: BindParams,
    /// `COL = :name` terms joined with ` AND `; empty when nothing matched.
    pub conditionals: String,
}

impl ProcessedFilters {
    /// ` WHERE <conditionals>` or an empty string.
    pub fn where_clause(&self) -> String {
        if self.conditionals.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditionals)
        }
    }
}

/// Turns a resource's declared filters into equality conditionals.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterProcessor {
    /// Declared filter names with the wrapper removed, in declaration order.
    filters: Vec<(String, AttributeKind)>,
    column_names: IndexMap<String, String>,
}

impl FilterProcessor {
    pub fn new(parameters: &[GetParameter], column_names: IndexMap<String, String>) -> Self {
        let filters = parameters
            .iter()
            .map(|p| (normalize_filter_name(p.name), p.kind))
            .collect();
        Self {
            filters,
            column_names,
        }
    }

    /// Declared filter names, unwrapped, in declaration order.
    pub fn filter_names(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|(name, _)| name.as_str())
    }

    /// Converts raw query-string pairs into typed filter values.
    ///
    /// Declared filters are parsed according to their declared kind; a value
    /// that does not parse is rejected. Undeclared parameters are passed
    /// through as text so [`Self::process_get_filters`] can ignore them.
    pub fn typed_filters(&self, query: &[(String, String)]) -> Result<IndexMap<String, SqlValue>> {
        let mut typed = IndexMap::with_capacity(query.len());
        for (raw_name, raw_value) in query {
            let name = normalize_filter_name(raw_name);
            let value = match self.filters.iter().find(|(n, _)| *n == name) {
                Some((_, kind)) => {
                    kind.parse(raw_value)
                        .ok_or_else(|| QueryError::InvalidFilterValue {
                            name: name.clone(),
                            value: raw_value.clone(),
                        })?
                }
                None => SqlValue::Text(raw_value.clone()),
            };
            typed.insert(raw_name.clone(), value);
        }
        Ok(typed)
    }

    /// Builds bind parameters and conditionals from arbitrary filters.
    ///
    /// Only declared filters are kept, in declaration order regardless of
    /// the input order. Each yields `"<COLUMN> = :<name>"`.
    pub fn process_get_filters(&self, filters: &IndexMap<String, SqlValue>) -> ProcessedFilters {
        let normalized = normalize_filter_names(filters);
        let mut bind_params = BindParams::new();
        let mut terms = Vec::new();

        for (name, _) in &self.filters {
            let Some(value) = normalized.get(name) else {
                continue;
            };
            let Some(column) = self.column_names.get(name) else {
                debug!(filter = %name, "Declared filter has no column mapping, ignoring");
                continue;
            };
            terms.push(format!("{column} = :{name}"));
            bind_params.insert_in(name.clone(), value.clone());
        }

        ProcessedFilters {
            bind_params,
            conditionals: terms.join(" AND "),
        }
    }
}
