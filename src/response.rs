//! Uniform response envelope.
//!
//! Every operation, success or failure, answers with the same shape:
//!
//! ```json
//! {
//!   "meta": { "route": "users.list" },
//!   "status": { "success": true, "message": "ok" },
//!   "data": [...],
//!   "pagination": { "total": 12, "total_pages": 3, "current_page": 2 },
//!   "errors": [{ "field": "email", "message": "invalid email" }]
//! }
//! ```
//!
//! `data`, `pagination`, and `errors` are omitted when absent.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::validation::ValidationError;

/// Request metadata echoed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    /// Logical route name, e.g. `users.create`.
    pub route: String,
}

/// Outcome of the operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationStatus {
    pub success: bool,
    pub message: String,
}

/// Pagination block attached to list responses.
#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub total_pages: u64,
    pub current_page: u64,
}

impl Pagination {
    /// Derive page counts from a total and a per-page limit.
    #[must_use]
    pub fn new(total: u64, limit: u64, current_page: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            total,
            total_pages,
            current_page,
        }
    }
}

/// The envelope itself. Constructed by handlers and by [`crate::errors::ApiError`].
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub meta: Meta,
    pub status: OperationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ValidationError>>,
}

impl ApiResponse {
    #[must_use]
    pub fn success(route: impl Into<String>, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            meta: Meta { route: route.into() },
            status: OperationStatus {
                success: true,
                message: message.into(),
            },
            data,
            pagination: None,
            errors: None,
        }
    }

    #[must_use]
    pub fn failure(
        route: impl Into<String>,
        message: impl Into<String>,
        errors: Option<Vec<ValidationError>>,
    ) -> Self {
        Self {
            meta: Meta { route: route.into() },
            status: OperationStatus {
                success: false,
                message: message.into(),
            },
            data: None,
            pagination: None,
            errors,
        }
    }

    #[must_use]
    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Finalize with an explicit status code.
    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = if self.status.success {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        self.into_response_with(status)
    }
}
