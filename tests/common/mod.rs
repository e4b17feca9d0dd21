//! Shared test fixtures: a two-entity app and request helpers.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use regex::Regex;
use serde_json::{json, Value};
use tower::ServiceExt;

use crudgen::routes::{entity_router, RouteRule};
use crudgen::schema::{EntitySchema, FieldSpec, SemanticHint};
use crudgen::store::ModelRegistry;

pub fn users_schema() -> EntitySchema {
    EntitySchema::new("users")
        .field(
            "name",
            FieldSpec::string().required("name is required").length(2, 64),
        )
        .field(
            "email",
            FieldSpec::string()
                .required("email is required")
                .unique()
                .pattern(
                    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap(),
                    "invalid email",
                )
                .hint(SemanticHint::Email),
        )
        .field("age", FieldSpec::number().range(18.0, 99.0))
        .field("active", FieldSpec::boolean())
}

/// No unique fields, so bulk dummy inserts never collide.
pub fn articles_schema() -> EntitySchema {
    EntitySchema::new("articles")
        .field(
            "title",
            FieldSpec::string().required("title is required").length(4, 80),
        )
        .field(
            "body",
            FieldSpec::string().hint(SemanticHint::FreeText).min_length(40),
        )
        .field("views", FieldSpec::number().range(0.0, 10_000.0))
        .field("published", FieldSpec::boolean())
}

pub fn test_app() -> Router {
    let registry = Arc::new(ModelRegistry::new());
    Router::new()
        .nest(
            "/users",
            entity_router(&registry, users_schema(), RouteRule::defaults()),
        )
        .nest(
            "/articles",
            entity_router(&registry, articles_schema(), RouteRule::defaults()),
        )
}

async fn read_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Body-less request, parsed envelope back.
pub async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, read_body(response).await)
}

/// JSON request with the matching content type.
pub async fn send_json(app: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, read_body(response).await)
}

/// Raw request with full control of the content type and payload.
pub async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    content_type: Option<&str>,
    payload: &[u8],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(ct) = content_type {
        builder = builder.header(CONTENT_TYPE, ct);
    }
    let request = builder.body(Body::from(payload.to_vec())).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, read_body(response).await)
}

/// Create a user and return its generated id.
pub async fn create_user(app: &Router, name: &str, email: &str, age: u32) -> String {
    let (status, body) = send_json(
        app,
        Method::POST,
        "/users",
        json!({ "name": name, "email": email, "age": age, "active": true }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    body["data"]["id"].as_str().unwrap().to_string()
}
