//! Query building blocks for the pizzeria API.
//!
//! This crate holds everything between an HTTP request and a SQL statement
//! that does not need a database:
//!
//! - [`schema`]: immutable descriptions of the dough, ingredient and pizza resources
//! - [`filter`]: `filter[x]` query parameters to equality conditionals
//! - [`bind_params`]: request attributes to named bind parameters, out-bind normalization
//! - [`rows`]: prefixed column extraction and grouping of joined rows
//! - [`body`]: JSON:API request documents and their validation

pub mod bind_params;
pub mod body;
pub mod error;
pub mod filter;
pub mod rows;
pub mod schema;
pub mod value;

pub use bind_params::{convert_out_binds_to_raw_resource, get_bind_params, out_bind_param_to_property_name};
pub use body::{
    BodyMode, RelationshipData, RelationshipDocument, ResourceData, ResourceDocument, ResourceIdentifier,
    validate_body,
};
pub use error::QueryError;
pub use filter::{FilterProcessor, ProcessedFilters, normalize_filter_name, normalize_filter_names};
pub use rows::{JoinRowGrouper, RawPizza, extract_raw_resource};
pub use schema::{AttributeDef, AttributeKind, GetParameter, RelationshipDef, ResourceSchema, Schemas};
pub use value::{BindParams, BindValue, OutBinds, OutType, RawResource, Row, SqlValue};
