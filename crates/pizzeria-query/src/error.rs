//! Errors raised while turning requests into SQL and rows into records.

/// Errors produced by filter processing, bind-parameter building and
/// request-body validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// An attribute outside the declared property set reached the
    /// bind-parameter builder. Request validation should have rejected it.
    #[error("Invalid attribute {0} found")]
    InvalidAttribute(String),

    /// The request body attribute is not part of the resource.
    #[error("Attribute {0} is not a valid attribute")]
    UnknownAttribute(String),

    /// The request body does not have the JSON:API document shape.
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    /// The request body is well formed but carries invalid values.
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// A filter value could not be converted to the declared kind.
    #[error("Invalid value '{value}' for filter {name}")]
    InvalidFilterValue { name: String, value: String },

    /// The body's type or id does not match the target of the request.
    #[error("{0}")]
    Conflict(String),

    /// An `include` entry names a relationship the resource does not have.
    #[error("Unknown include {0}")]
    UnknownInclude(String),
}

impl QueryError {
    /// Returns `true` when the error was caused by client input.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::InvalidAttribute(_))
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
