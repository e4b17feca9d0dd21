//! Route rules and operation handlers.
//!
//! A [`RouteRule`] declares how one operation is reachable: HTTP method, one
//! or more path aliases, whether request validation runs, an optional
//! required content type, and an optional response-shaping pipeline.
//! [`entity_router`] turns a rule set into an `axum::Router` whose handlers
//! all receive the same [`RequestContext`].
//!
//! Per-request composition order: content-type check (when declared) →
//! request-body check (for body-reading operations) → declared-schema
//! validation (skippable per rule) → operation handler.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query},
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode},
    response::Response,
    routing::{on, MethodFilter},
    Router,
};
use serde_json::{json, Map, Value};

use crate::errors::ApiError;
use crate::generate::synthesize_many;
use crate::pipeline::{count_variant, merge_criteria, SortOrder, Stage};
use crate::query::{parse_count, parse_list_query, ListQuery};
use crate::response::{ApiResponse, Pagination};
use crate::schema::EntitySchema;
use crate::store::{
    display_value, Document, ModelRegistry, PersistedEntity, SortSpec, CREATED_AT_FIELD, ID_FIELD,
};
use crate::validation::{validate_identifier, validate_identifier_list, RequestValidator};

/// Ceiling on one bulk-delete request.
const MAX_BULK_DELETE: usize = 100;

/// Ceiling on one dummy-generation request, bounding the batch built in
/// memory before insertion.
const MAX_DUMMY_RECORDS: usize = 100;

/// The operation a route rule maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    List,
    Get,
    Update,
    DeleteOne,
    DeleteMany,
    DeleteAll,
    CreateDummy,
}

impl OperationKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::List => "list",
            Self::Get => "get",
            Self::Update => "update",
            Self::DeleteOne => "delete_one",
            Self::DeleteMany => "delete_many",
            Self::DeleteAll => "delete_all",
            Self::CreateDummy => "create_dummy",
        }
    }

    /// Whether the operation reads a request body.
    fn reads_body(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

/// Declarative mapping from method and path aliases to an operation.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub method: Method,
    /// Non-empty; multiple aliases may serve the same operation.
    pub path_aliases: Vec<String>,
    pub operation: OperationKind,
    pub validation_enabled: bool,
    /// Required request content type, checked before anything else.
    pub content_type: Option<String>,
    /// Declared response-shaping pipeline, shared across requests.
    pub pipeline: Option<Vec<Stage>>,
}

impl RouteRule {
    /// # Panics
    ///
    /// Panics when `aliases` is empty; a rule without a path is a
    /// configuration error.
    #[must_use]
    pub fn new<I, S>(method: Method, aliases: I, operation: OperationKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path_aliases: Vec<String> = aliases.into_iter().map(Into::into).collect();
        assert!(!path_aliases.is_empty(), "route rule requires at least one path alias");
        Self {
            method,
            path_aliases,
            operation,
            validation_enabled: true,
            content_type: None,
            pipeline: None,
        }
    }

    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn without_validation(mut self) -> Self {
        self.validation_enabled = false;
        self
    }

    #[must_use]
    pub fn pipeline(mut self, stages: Vec<Stage>) -> Self {
        self.pipeline = Some(stages);
        self
    }

    /// The standard rule set covering every operation, with conventional
    /// aliases.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(Method::POST, ["/", "/create"], OperationKind::Create)
                .content_type("application/json"),
            Self::new(Method::POST, ["/create/dummy", "/dummy"], OperationKind::CreateDummy)
                .without_validation(),
            Self::new(Method::GET, ["/", "/all", "/list"], OperationKind::List),
            Self::new(Method::GET, ["/{id}"], OperationKind::Get),
            Self::new(Method::PATCH, ["/{id}"], OperationKind::Update)
                .content_type("application/json"),
            Self::new(Method::DELETE, ["/{id}"], OperationKind::DeleteOne),
            Self::new(Method::DELETE, ["/"], OperationKind::DeleteMany),
            Self::new(Method::DELETE, ["/all"], OperationKind::DeleteAll),
        ]
    }
}

/// Everything a handler needs, passed uniformly to every operation.
#[derive(Debug)]
pub struct RequestContext {
    pub registry: Arc<ModelRegistry>,
    pub entity: Arc<PersistedEntity>,
    pub rule: RouteRule,
    /// Logical route name echoed in the envelope, e.g. `users.list`.
    pub route_name: String,
}

impl RequestContext {
    fn schema(&self) -> &EntitySchema {
        self.entity.schema()
    }
}

/// Build an `axum::Router` serving `rules` for `schema`, registering the
/// entity in `registry` (idempotently) on the way.
///
/// Mount the result under the entity's base path, e.g.
/// `Router::new().nest("/users", entity_router(&registry, users, RouteRule::defaults()))`.
#[must_use]
pub fn entity_router(
    registry: &Arc<ModelRegistry>,
    schema: EntitySchema,
    rules: Vec<RouteRule>,
) -> Router {
    let entity = registry.get_or_create(schema);
    let mut router = Router::new();

    for rule in rules {
        let route_name = format!("{}.{}", entity.name(), rule.operation.name());
        let ctx = Arc::new(RequestContext {
            registry: Arc::clone(registry),
            entity: Arc::clone(&entity),
            rule,
            route_name,
        });
        for alias in ctx.rule.path_aliases.clone() {
            tracing::debug!(
                route = %ctx.route_name,
                method = %ctx.rule.method,
                path = %alias,
                "registering route"
            );
            let ctx = Arc::clone(&ctx);
            let method = method_filter(&ctx.rule.method);
            let handler = move |params: Option<Path<HashMap<String, String>>>,
                                Query(query): Query<HashMap<String, String>>,
                                headers: HeaderMap,
                                body: Bytes| {
                let ctx = Arc::clone(&ctx);
                async move {
                    let params = params.map_or_else(HashMap::new, |Path(map)| map);
                    dispatch(ctx, params, query, &headers, &body).await
                }
            };
            router = router.route(&alias, on(method, handler));
        }
    }
    router
}

fn method_filter(method: &Method) -> MethodFilter {
    match *method {
        Method::POST => MethodFilter::POST,
        Method::PUT => MethodFilter::PUT,
        Method::PATCH => MethodFilter::PATCH,
        Method::DELETE => MethodFilter::DELETE,
        _ => MethodFilter::GET,
    }
}

/// Run the middleware chain and the operation, folding any failure into the
/// uniform envelope.
async fn dispatch(
    ctx: Arc<RequestContext>,
    params: HashMap<String, String>,
    query: HashMap<String, String>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Response {
    match run(&ctx, &params, &query, headers, body).await {
        Ok(response) => response,
        Err(err) => err.into_envelope(&ctx.route_name),
    }
}

async fn run(
    ctx: &RequestContext,
    params: &HashMap<String, String>,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, ApiError> {
    // 1. declared content type
    if let Some(expected) = &ctx.rule.content_type {
        let received = headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok());
        if !received.is_some_and(|ct| ct.starts_with(expected.as_str())) {
            return Err(ApiError::unsupported_media_type(
                expected.clone(),
                received.map(ToString::to_string),
            ));
        }
    }

    // 2. body presence, for operations that read one
    let body_json: Option<Value> = if ctx.rule.operation.reads_body() {
        if body.is_empty() {
            return Err(ApiError::bad_request("request body must not be empty"));
        }
        Some(
            serde_json::from_slice(body)
                .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))?,
        )
    } else {
        None
    };

    // 3 + 4. declared-schema validation, then the operation itself
    match ctx.rule.operation {
        OperationKind::Create => {
            let doc = validated_body(ctx, body_json.as_ref(), true)?;
            create(ctx, doc).await
        }
        OperationKind::Update => {
            let id = id_param(ctx, params)?;
            let patch = validated_body(ctx, body_json.as_ref(), false)?;
            update(ctx, &id, patch).await
        }
        OperationKind::List => list(ctx, query).await,
        OperationKind::Get => {
            let id = id_param(ctx, params)?;
            get(ctx, &id).await
        }
        OperationKind::DeleteOne => {
            let id = id_param(ctx, params)?;
            delete_one(ctx, &id).await
        }
        OperationKind::DeleteMany => {
            let ids = ids_param(ctx, query)?;
            delete_many(ctx, &ids).await
        }
        OperationKind::DeleteAll => delete_all(ctx).await,
        OperationKind::CreateDummy => create_dummy(ctx, query).await,
    }
}

fn validated_body(
    ctx: &RequestContext,
    body: Option<&Value>,
    creating: bool,
) -> Result<Document, ApiError> {
    let body = body.ok_or_else(|| ApiError::bad_request("request body must not be empty"))?;
    if ctx.rule.validation_enabled {
        let validator = if creating {
            RequestValidator::for_create(ctx.schema())
        } else {
            RequestValidator::for_update(ctx.schema())
        };
        validator.validate_body(body).map_err(ApiError::validation)
    } else {
        body.as_object()
            .cloned()
            .ok_or_else(|| ApiError::bad_request("request body must be a JSON object"))
    }
}

fn id_param(ctx: &RequestContext, params: &HashMap<String, String>) -> Result<String, ApiError> {
    let raw = params
        .get("id")
        .ok_or_else(|| ApiError::bad_request("missing `id` path parameter"))?;
    if ctx.rule.validation_enabled {
        validate_identifier("id", raw).map_err(|err| ApiError::validation(vec![err]))?;
    }
    Ok(raw.clone())
}

fn ids_param(ctx: &RequestContext, query: &HashMap<String, String>) -> Result<Vec<String>, ApiError> {
    let raw = query
        .get("ids")
        .ok_or_else(|| ApiError::bad_request("`ids` query parameter is required"))?;
    if ctx.rule.validation_enabled {
        validate_identifier_list("ids", raw).map_err(ApiError::validation)
    } else {
        Ok(raw.split(',').map(ToString::to_string).collect())
    }
}

/// Advisory uniqueness pre-check: a fast, friendly rejection path. The store
/// re-checks under its lock, which is the guarantee that actually holds
/// under concurrency.
async fn ensure_unique(
    ctx: &RequestContext,
    doc: &Document,
    exclude_id: Option<&str>,
) -> Result<(), ApiError> {
    for (field, _) in ctx.schema().unique_fields() {
        if let Some(value) = doc.get(field) {
            if ctx.entity.exists_with(field, value, exclude_id).await {
                return Err(ApiError::conflict(field, display_value(value)));
            }
        }
    }
    Ok(())
}

/// Shape records for a response: through the declared pipeline with the
/// criteria merged in, or a populated fetch when no pipeline is configured.
async fn shape(ctx: &RequestContext, criteria: Document) -> Vec<Document> {
    match &ctx.rule.pipeline {
        Some(stages) => {
            let merged = merge_criteria(stages, &criteria);
            ctx.entity.aggregate(&merged).await.into_documents()
        }
        None => {
            let mut docs = ctx
                .entity
                .find(&criteria, &SortSpec::NewestFirst, 0, None)
                .await;
            ctx.registry.populate(ctx.schema(), &mut docs).await;
            docs
        }
    }
}

fn id_criteria(id: &str) -> Document {
    let mut criteria = Map::new();
    criteria.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    criteria
}

async fn create(ctx: &RequestContext, doc: Document) -> Result<Response, ApiError> {
    ensure_unique(ctx, &doc, None).await?;
    let inserted = ctx.entity.insert(doc).await?;
    let id = inserted
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| {
            ApiError::internal("storage error", Some("inserted record has no id".into()))
        })?;

    let data = shape(ctx, id_criteria(&id)).await.into_iter().next();
    Ok(
        ApiResponse::success(&ctx.route_name, "created", data.map(Value::Object))
            .into_response_with(StatusCode::CREATED),
    )
}

async fn list(ctx: &RequestContext, query: &HashMap<String, String>) -> Result<Response, ApiError> {
    let parsed: ListQuery = parse_list_query(query, ctx.schema())?;

    let (rows, total) = match &ctx.rule.pipeline {
        None => {
            let mut rows = ctx
                .entity
                .find(&parsed.filter, &parsed.sort, parsed.skip(), Some(parsed.limit))
                .await;
            ctx.registry.populate(ctx.schema(), &mut rows).await;
            // Independent second read; not a snapshot of the page fetch.
            let total = ctx.entity.count(&parsed.filter).await;
            (rows, total)
        }
        Some(stages) => {
            let mut shaped = merge_criteria(stages, &parsed.filter);
            shaped.push(Stage::Sort(sort_stage(&parsed.sort)));
            shaped.push(Stage::Skip(parsed.skip()));
            shaped.push(Stage::Limit(parsed.limit));
            let rows = ctx.entity.aggregate(&shaped).await.into_documents();
            let total = ctx.entity.aggregate(&count_variant(&shaped)).await.count();
            (rows, total)
        }
    };

    if rows.is_empty() {
        return Err(ApiError::not_found(
            ctx.entity.name(),
            Some(format!(
                "no records match filter {}",
                Value::Object(parsed.filter.clone())
            )),
        ));
    }

    let data = Value::Array(rows.into_iter().map(Value::Object).collect());
    Ok(ApiResponse::success(&ctx.route_name, "ok", Some(data))
        .with_pagination(Pagination::new(
            total as u64,
            parsed.limit as u64,
            parsed.page as u64,
        ))
        .into_response_with(StatusCode::OK))
}

fn sort_stage(sort: &SortSpec) -> Vec<(String, SortOrder)> {
    match sort {
        SortSpec::NewestFirst => vec![(CREATED_AT_FIELD.to_string(), SortOrder::Desc)],
        SortSpec::Field { name, descending } => vec![(
            name.clone(),
            if *descending { SortOrder::Desc } else { SortOrder::Asc },
        )],
    }
}

async fn get(ctx: &RequestContext, id: &str) -> Result<Response, ApiError> {
    let doc = shape(ctx, id_criteria(id))
        .await
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found(ctx.entity.name(), Some(id.to_string())))?;
    Ok(
        ApiResponse::success(&ctx.route_name, "ok", Some(Value::Object(doc)))
            .into_response_with(StatusCode::OK),
    )
}

async fn update(ctx: &RequestContext, id: &str, patch: Document) -> Result<Response, ApiError> {
    if ctx.entity.find_by_id(id).await.is_none() {
        return Err(ApiError::not_found(ctx.entity.name(), Some(id.to_string())));
    }
    ensure_unique(ctx, &patch, Some(id)).await?;

    ctx.entity
        .update(id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found(ctx.entity.name(), Some(id.to_string())))?;

    // Re-read through the same shaping path get-by-id uses, so the response
    // reflects current population/pipeline state rather than the raw update.
    let doc = shape(ctx, id_criteria(id))
        .await
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found(ctx.entity.name(), Some(id.to_string())))?;
    Ok(
        ApiResponse::success(&ctx.route_name, "updated", Some(Value::Object(doc)))
            .into_response_with(StatusCode::OK),
    )
}

async fn delete_one(ctx: &RequestContext, id: &str) -> Result<Response, ApiError> {
    if !ctx.entity.delete_by_id(id).await {
        return Err(ApiError::not_found(ctx.entity.name(), Some(id.to_string())));
    }
    Ok(
        ApiResponse::success(&ctx.route_name, "deleted", Some(json!({ "id": id })))
            .into_response_with(StatusCode::OK),
    )
}

/// All-or-nothing bulk delete: if any requested id is missing, nothing is
/// deleted and the missing ids are named.
async fn delete_many(ctx: &RequestContext, ids: &[String]) -> Result<Response, ApiError> {
    if ids.len() > MAX_BULK_DELETE {
        return Err(ApiError::bad_request(format!(
            "bulk delete is limited to {MAX_BULK_DELETE} records, got {}",
            ids.len()
        )));
    }

    let mut missing = Vec::new();
    for id in ids {
        if ctx.entity.find_by_id(id).await.is_none() {
            missing.push(id.clone());
        }
    }
    if !missing.is_empty() {
        return Err(ApiError::not_found(
            ctx.entity.name(),
            Some(format!("missing ids: {}", missing.join(", "))),
        ));
    }

    let deleted = ctx.entity.delete_many(ids).await;
    Ok(ApiResponse::success(
        &ctx.route_name,
        format!("deleted {deleted} records"),
        Some(json!({ "ids": ids })),
    )
    .into_response_with(StatusCode::OK))
}

async fn delete_all(ctx: &RequestContext) -> Result<Response, ApiError> {
    let expected = ctx.entity.count(&Map::new()).await;
    if expected == 0 {
        return Err(ApiError::not_found(
            ctx.entity.name(),
            Some("collection is empty".to_string()),
        ));
    }

    let deleted = ctx.entity.delete_all().await;
    if deleted != expected {
        // A concurrent writer slipped between the count and the clear.
        return Err(ApiError::internal(
            "deletion count mismatch",
            Some(format!("expected to delete {expected}, deleted {deleted}")),
        ));
    }
    Ok(ApiResponse::success(
        &ctx.route_name,
        format!("deleted {deleted} records"),
        Some(json!({ "deleted": deleted })),
    )
    .into_response_with(StatusCode::OK))
}

/// Best-effort bulk load: individual storage rejections are logged and
/// skipped, never aborting the batch.
async fn create_dummy(
    ctx: &RequestContext,
    query: &HashMap<String, String>,
) -> Result<Response, ApiError> {
    let count = parse_count(query)?;
    if count > MAX_DUMMY_RECORDS {
        return Err(ApiError::bad_request(format!(
            "dummy generation is limited to {MAX_DUMMY_RECORDS} records, got {count}"
        )));
    }

    let mut inserted_ids = Vec::new();
    for candidate in synthesize_many(ctx.schema(), count) {
        match ctx.entity.insert(candidate).await {
            Ok(doc) => {
                if let Some(id) = doc.get(ID_FIELD).cloned() {
                    inserted_ids.push(id);
                }
            }
            Err(err) => {
                tracing::debug!(
                    entity = %ctx.entity.name(),
                    "dummy record rejected by storage: {err}"
                );
            }
        }
    }

    let mut criteria = Map::new();
    criteria.insert(ID_FIELD.to_string(), Value::Array(inserted_ids.clone()));
    let rows = shape(ctx, criteria).await;

    let message = format!("inserted {} of {count} dummy records", inserted_ids.len());
    let data = Value::Array(rows.into_iter().map(Value::Object).collect());
    Ok(ApiResponse::success(&ctx.route_name, message, Some(data))
        .into_response_with(StatusCode::CREATED))
}
