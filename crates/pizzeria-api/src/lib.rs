use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Media type of every JSON:API document this server emits.
pub const JSONAPI_MEDIA_TYPE: &str = "application/vnd.api+json";

fn jsonapi_content_type() -> HeaderValue {
    HeaderValue::from_static(JSONAPI_MEDIA_TYPE)
}

// -------------------------
// JSON:API Documents
// -------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,
}

impl Links {
    pub fn self_only(self_link: impl Into<String>) -> Self {
        Self {
            self_link: self_link.into(),
            related: None,
        }
    }

    pub fn with_related(self_link: impl Into<String>, related: impl Into<String>) -> Self {
        Self {
            self_link: self_link.into(),
            related: Some(related.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResourceLinkage {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

impl ResourceLinkage {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

/// Relationship data: an identifier or `null` for to-one, an array for to-many.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Linkage {
    Many(Vec<ResourceLinkage>),
    One(Option<ResourceLinkage>),
}

/// A relationship member. `data` is left out when the linkage was not loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Linkage>,
    pub links: Links,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub relationships: IndexMap<String, Relationship>,
    pub links: Links,
}

impl ResourceObject {
    pub fn linkage(&self) -> ResourceLinkage {
        ResourceLinkage::new(self.resource_type.clone(), self.id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PrimaryData {
    Many(Vec<ResourceObject>),
    One(Box<ResourceObject>),
}

/// Top-level JSON:API document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub data: PrimaryData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<ResourceObject>,
    pub links: Links,
}

impl Document {
    pub fn single(resource: ResourceObject, self_link: impl Into<String>) -> Self {
        Self {
            data: PrimaryData::One(Box::new(resource)),
            included: Vec::new(),
            links: Links::self_only(self_link),
        }
    }

    pub fn collection(resources: Vec<ResourceObject>, self_link: impl Into<String>) -> Self {
        Self {
            data: PrimaryData::Many(resources),
            included: Vec::new(),
            links: Links::self_only(self_link),
        }
    }

    /// Adds compound resources. Each `(type, id)` appears at most once; the
    /// first occurrence wins.
    #[must_use]
    pub fn with_included(mut self, resources: impl IntoIterator<Item = ResourceObject>) -> Self {
        let mut seen: IndexSet<ResourceLinkage> = self.included.iter().map(ResourceObject::linkage).collect();
        for resource in resources {
            if seen.insert(resource.linkage()) {
                self.included.push(resource);
            }
        }
        self
    }

    /// Id of the primary resource of a single-resource document.
    pub fn primary_id(&self) -> Option<&str> {
        match &self.data {
            PrimaryData::One(resource) => Some(resource.id.as_str()),
            PrimaryData::Many(_) => None,
        }
    }
}

// -------------------------
// Error Documents
// -------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    pub status: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorObject>,
}

impl ErrorDocument {
    pub fn single(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            errors: vec![ErrorObject {
                status: status.as_u16().to_string(),
                title: status.canonical_reason().unwrap_or("Error").to_string(),
                detail: Some(detail.into()),
            }],
        }
    }
}

/// High-level API errors mapped to HTTP responses with a JSON:API error document.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn unsupported_media_type(msg: impl Into<String>) -> Self {
        Self::UnsupportedMediaType(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::UnsupportedMediaType(msg)
            | ApiError::Internal(msg) => msg,
        }
    }

    pub fn to_error_document(&self) -> ErrorDocument {
        ErrorDocument::single(self.status_code(), self.detail())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::to_vec(&self.to_error_document()).unwrap_or_else(|_| b"{\"errors\":[]}".to_vec());
        (
            self.status_code(),
            [(header::CONTENT_TYPE, jsonapi_content_type())],
            body,
        )
            .into_response()
    }
}


// -------------------------
// API Response Wrapper
// -------------------------

#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub value: T,
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl<T> ApiResponse<T> {
    pub fn new(value: T, status: StatusCode) -> Self {
        Self {
            value,
            status,
            headers: Vec::new(),
        }
    }

    pub fn ok(value: T) -> Self {
        Self::new(value, StatusCode::OK)
    }

    pub fn created(value: T) -> Self {
        Self::new(value, StatusCode::CREATED)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = match serde_json::to_vec(&self.value) {
            Ok(b) => b,
            Err(err) => return ApiError::internal(format!("Serialization failure: {err}")).into_response(),
        };
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, jsonapi_content_type());
        for (name, value) in self.headers {
            headers.insert(name, value);
        }
        (self.status, headers, body).into_response()
    }
}


// -------------------------
// Content Negotiation
// -------------------------

/// Validate the Accept header: allow application/vnd.api+json, application/json and */*.
pub fn validate_accept(headers: &HeaderMap) -> Result<(), ApiError> {
    if let Some(accept) = headers.get(header::ACCEPT) {
        let val = accept.to_str().unwrap_or("").to_ascii_lowercase();
        let allowed = val.contains(JSONAPI_MEDIA_TYPE)
            || val.contains("application/json")
            || val.contains("application/*")
            || val.contains("*/*");
        if !allowed {
            return Err(ApiError::unsupported_media_type(format!(
                "Unsupported Accept: {val}. Only {JSONAPI_MEDIA_TYPE} or application/json are supported."
            )));
        }
    }
    Ok(())
}

/// Validate Content-Type for requests with bodies.
pub fn validate_content_type(headers: &HeaderMap) -> Result<(), ApiError> {
    let val = headers
        .get(header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    let allowed = val.starts_with(JSONAPI_MEDIA_TYPE) || val.starts_with("application/json");
    if !allowed {
        return Err(ApiError::unsupported_media_type(format!(
            "Unsupported Content-Type: {val}. Only {JSONAPI_MEDIA_TYPE} or application/json are supported."
        )));
    }
    Ok(())
}


// -------------------------
// Links
// -------------------------

/// Joins URL segments with single slashes: `("/v1", "pizzas", "3")` -> `/v1/pizzas/3`.
pub fn resource_path_link(base_url: &str, segments: &[&str]) -> String {
    let mut link = base_url.trim_end_matches('/').to_string();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if !segment.is_empty() {
            link.push('/');
            link.push_str(segment);
        }
    }
    link
}

/// Appends query parameters to `url`, keeping their order. Keys keep their
/// `filter[x]` brackets; values are percent-encoded.
pub fn params_link(url: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{url}?{query}")
}
