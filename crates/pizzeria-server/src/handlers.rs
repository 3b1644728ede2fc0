use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use pizzeria_api::{ApiError, ApiResponse, Document};
use pizzeria_db_postgres::{PizzaIncludes, ResourceDao};
use pizzeria_query::{BodyMode, QueryError, ResourceSchema, validate_body};
use pizzeria_storage::{ConstraintKind, StorageError};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::server::AppState;

type ApiResult = Result<ApiResponse<Document>, ApiError>;
type QueryParams = Vec<(String, String)>;

const INCLUDE_PARAM: &str = "include";

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match state.provider.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "ready" })),
        Err(err) => {
            warn!(error = %err, backend = state.provider.backend_name(), "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse { status: "unavailable" }),
            )
        }
    }
}

// ---- Doughs ----

pub async fn list_doughs(State(state): State<AppState>, Query(params): Query<QueryParams>) -> ApiResult {
    list_resources(&state, &state.daos.doughs, &params).await
}

pub async fn get_dough(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    get_resource(&state, &state.daos.doughs, &id).await
}

pub async fn create_dough(State(state): State<AppState>, body: Bytes) -> ApiResult {
    create_resource(&state, &state.daos.doughs, &body).await
}

pub async fn update_dough(State(state): State<AppState>, Path(id): Path<String>, body: Bytes) -> ApiResult {
    update_resource(&state, &state.daos.doughs, &id, &body).await
}

// ---- Ingredients ----

pub async fn list_ingredients(State(state): State<AppState>, Query(params): Query<QueryParams>) -> ApiResult {
    list_resources(&state, &state.daos.ingredients, &params).await
}

pub async fn get_ingredient(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    get_resource(&state, &state.daos.ingredients, &id).await
}

pub async fn create_ingredient(State(state): State<AppState>, body: Bytes) -> ApiResult {
    create_resource(&state, &state.daos.ingredients, &body).await
}

pub async fn update_ingredient(State(state): State<AppState>, Path(id): Path<String>, body: Bytes) -> ApiResult {
    update_resource(&state, &state.daos.ingredients, &id, &body).await
}

// ---- Pizzas ----

pub async fn list_pizzas(State(state): State<AppState>, Query(params): Query<QueryParams>) -> ApiResult {
    let schema = &state.serializer.schemas().pizzas;
    let includes = pizza_includes(schema, &params)?;
    let filters = state
        .daos
        .pizzas
        .filter_processor()
        .typed_filters(&params)
        .map_err(query_error)?;

    let pizzas = state
        .daos
        .pizzas
        .get_pizzas(&filters, includes)
        .await
        .map_err(storage_error)?;
    Ok(ApiResponse::ok(state.serializer.pizza_collection(&pizzas, &params)?))
}

pub async fn get_pizza(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<QueryParams>,
) -> ApiResult {
    let schema = &state.serializer.schemas().pizzas;
    let includes = pizza_includes(schema, &params)?;
    let pizza = state
        .daos
        .pizzas
        .get_pizza_by_id(&id, includes)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found(schema, &id))?;
    Ok(ApiResponse::ok(state.serializer.pizza_document(&pizza)?))
}

pub async fn create_pizza(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let schema = &state.serializer.schemas().pizzas;
    let document = parse_document(&body, schema, BodyMode::Create, None)?;
    let created = state
        .daos
        .pizzas
        .post_pizza(&document)
        .await
        .map_err(storage_error)?;
    created_response(state.serializer.pizza_document(&created)?)
}

pub async fn update_pizza(State(state): State<AppState>, Path(id): Path<String>, body: Bytes) -> ApiResult {
    let schema = &state.serializer.schemas().pizzas;
    let document = parse_document(&body, schema, BodyMode::Update, Some(&id))?;
    let updated = state
        .daos
        .pizzas
        .update_pizza_by_id(&document)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found(schema, &id))?;
    Ok(ApiResponse::ok(state.serializer.pizza_document(&updated)?))
}

// ---- Flat resources ----

async fn list_resources(state: &AppState, dao: &ResourceDao, params: &[(String, String)]) -> ApiResult {
    let schema = dao.schema();
    if let Some(raw) = include_param(params) {
        schema.parse_includes(raw).map_err(query_error)?;
    }
    let filters = dao.filter_processor().typed_filters(params).map_err(query_error)?;
    let records = dao.get(&filters).await.map_err(storage_error)?;
    Ok(ApiResponse::ok(state.serializer.collection(schema, &records, params)?))
}

async fn get_resource(state: &AppState, dao: &ResourceDao, id: &str) -> ApiResult {
    let schema = dao.schema();
    let record = dao
        .get_by_id(id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found(schema, id))?;
    Ok(ApiResponse::ok(state.serializer.document(schema, &record)?))
}

async fn create_resource(state: &AppState, dao: &ResourceDao, body: &[u8]) -> ApiResult {
    let schema = dao.schema();
    let document = parse_document(body, schema, BodyMode::Create, None)?;
    let created = dao.post(&document).await.map_err(storage_error)?;
    created_response(state.serializer.document(schema, &created)?)
}

async fn update_resource(state: &AppState, dao: &ResourceDao, id: &str, body: &[u8]) -> ApiResult {
    let schema = dao.schema();
    let document = parse_document(body, schema, BodyMode::Update, Some(id))?;
    let updated = dao
        .patch(&document)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| not_found(schema, id))?;
    Ok(ApiResponse::ok(state.serializer.document(schema, &updated)?))
}

// ---- Helpers ----

/// Parses and validates a write body; `path_id` is the id addressed by a PATCH.
fn parse_document(
    body: &[u8],
    schema: &ResourceSchema,
    mode: BodyMode,
    path_id: Option<&str>,
) -> Result<pizzeria_query::ResourceDocument, ApiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| query_error(QueryError::MalformedBody(e.to_string())))?;
    let document = validate_body(&value, schema, mode).map_err(query_error)?;
    document.check_target(schema, path_id).map_err(query_error)?;
    Ok(document)
}

fn include_param(params: &[(String, String)]) -> Option<&str> {
    params
        .iter()
        .find(|(name, _)| name == INCLUDE_PARAM)
        .map(|(_, value)| value.as_str())
}

fn pizza_includes(schema: &ResourceSchema, params: &[(String, String)]) -> Result<PizzaIncludes, ApiError> {
    match include_param(params) {
        Some(raw) => {
            let names = schema.parse_includes(raw).map_err(query_error)?;
            Ok(PizzaIncludes::from_names(&names))
        }
        None => Ok(PizzaIncludes::NONE),
    }
}

fn created_response(document: Document) -> ApiResult {
    let location = HeaderValue::from_str(&document.links.self_link)
        .map_err(|e| ApiError::internal(format!("Invalid Location header: {e}")))?;
    Ok(ApiResponse::created(document).with_header(header::LOCATION, location))
}

fn not_found(schema: &ResourceSchema, id: &str) -> ApiError {
    ApiError::not_found(format!("No {} with ID {id} found", schema.resource_type))
}

/// Maps request-translation errors to client errors. An attribute that got
/// past validation is a server bug.
fn query_error(err: QueryError) -> ApiError {
    match err {
        QueryError::Conflict(msg) => ApiError::conflict(msg),
        QueryError::InvalidAttribute(_) => {
            error!(error = %err, "Unvalidated attribute reached the query layer");
            ApiError::internal("An unexpected error occurred")
        }
        other => ApiError::bad_request(other.to_string()),
    }
}

fn storage_error(err: StorageError) -> ApiError {
    match err {
        StorageError::NotFound { resource_type, id } => {
            ApiError::not_found(format!("No {resource_type} with ID {id} found"))
        }
        StorageError::RelationNotFound { relation, ids } => {
            warn!(relation = %relation, ids = ?ids, "Request references missing resources");
            ApiError::not_found(format!("Request includes invalid {relation} ids"))
        }
        StorageError::ConstraintViolation {
            kind: ConstraintKind::Unique,
            ref constraint,
            ..
        } => {
            warn!(constraint = ?constraint, "Unique constraint violated");
            ApiError::conflict("Resource conflicts with an existing resource")
        }
        other => {
            error!(error = %other, category = ?other.category(), "Storage operation failed");
            ApiError::internal("An unexpected error occurred")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_not_found_names_relation() {
        let err = storage_error(StorageError::relation_not_found("ingredients", ["9"]));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.detail(), "Request includes invalid ingredients ids");
    }

    #[test]
    fn database_errors_are_hidden() {
        let err = storage_error(StorageError::database("relation \"PIZZAS\" does not exist"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.detail(), "An unexpected error occurred");

        let err = storage_error(StorageError::consistency("two rows"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn query_errors_map_to_client_statuses() {
        assert_eq!(
            query_error(QueryError::Conflict("type".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            query_error(QueryError::UnknownInclude("crust".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            query_error(QueryError::InvalidAttribute("foo".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn include_param_is_found_among_filters() {
        let params = vec![
            ("filter[name]".to_string(), "Margherita".to_string()),
            ("include".to_string(), "dough".to_string()),
        ];
        assert_eq!(include_param(&params), Some("dough"));
        assert_eq!(include_param(&params[..1]), None);
    }
}
