use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use pizzeria_api::{validate_accept, validate_content_type};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

// Middleware that ensures each request has an X-Request-Id and mirrors it on the response
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    // If the incoming request already has a request-id, preserve it; otherwise generate one
    let req_id_value = req
        .headers()
        .get(&header_name)
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("unknown"));

    // Add to request extensions for downstream usage (e.g., logging)
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}

// Content negotiation middleware: Accept must allow JSON:API or plain JSON,
// and POST/PATCH bodies must be sent as one of them.
pub async fn content_negotiation(req: Request<Body>, next: Next) -> Response {
    if let Err(err) = validate_accept(req.headers()) {
        return err.into_response();
    }

    let needs_body_type = matches!(*req.method(), Method::POST | Method::PATCH);
    if needs_body_type && let Err(err) = validate_content_type(req.headers()) {
        return err.into_response();
    }

    next.run(req).await
}
