//! Error handling for generated APIs.
//!
//! Every failure surfaces to the caller in the uniform envelope with an
//! appropriate status code. Internal detail (storage failures, count
//! mismatches) is logged via `tracing` and never sent to the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::response::ApiResponse;
use crate::store::StoreError;
use crate::validation::ValidationError;

/// API error taxonomy with automatic logging and sanitized responses.
#[derive(Debug)]
pub enum ApiError {
    /// 404 - missing id, empty collection on delete-all, partial existence
    /// in bulk delete.
    NotFound {
        resource: String,
        detail: Option<String>,
    },

    /// 400 - malformed query or request shape.
    BadRequest { message: String },

    /// 409 - unique-field collision, detected at pre-check or at the
    /// storage boundary.
    Conflict { field: String, value: String },

    /// 400 - request fails the declared per-operation schema.
    Validation { errors: Vec<ValidationError> },

    /// 415 - declared content-type mismatch.
    UnsupportedMediaType {
        expected: String,
        received: Option<String>,
    },

    /// 500 - storage failure, deletion-count mismatch, pipeline execution
    /// failure. Detail is logged, not exposed.
    Internal {
        message: String,
        internal: Option<String>,
    },
}

impl ApiError {
    pub fn not_found(resource: impl Into<String>, detail: Option<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            detail,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn conflict(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Conflict {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn validation(errors: Vec<ValidationError>) -> Self {
        Self::Validation { errors }
    }

    pub fn unsupported_media_type(expected: impl Into<String>, received: Option<String>) -> Self {
        Self::UnsupportedMediaType {
            expected: expected.into(),
            received,
        }
    }

    pub fn internal(message: impl Into<String>, internal: Option<String>) -> Self {
        Self::Internal {
            message: message.into(),
            internal,
        }
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } | Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-facing message, sanitized.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { resource, detail } => match detail {
                Some(detail) => format!("{resource} not found: {detail}"),
                None => format!("{resource} not found"),
            },
            Self::BadRequest { message } => message.clone(),
            Self::Conflict { field, value } => {
                format!("value `{value}` for unique field `{field}` already exists")
            }
            Self::Validation { errors } => {
                if errors.len() == 1 {
                    errors[0].to_string()
                } else {
                    format!("validation failed with {} errors", errors.len())
                }
            }
            Self::UnsupportedMediaType { expected, received } => match received {
                Some(received) => format!("expected content type `{expected}`, got `{received}`"),
                None => format!("expected content type `{expected}`"),
            },
            Self::Internal { message, .. } => message.clone(),
        }
    }

    /// Log internal detail server-side; the client only sees the sanitized
    /// message.
    fn log_internal(&self) {
        match self {
            Self::Internal {
                internal: Some(detail),
                message,
            } => {
                tracing::error!(detail = %detail, "internal error: {message}");
            }
            Self::Internal { message, .. } => {
                tracing::error!("internal error: {message}");
            }
            _ => {
                tracing::debug!(status = %self.status_code(), "api error: {}", self.user_message());
            }
        }
    }

    /// Render into the uniform envelope under the given route name.
    pub fn into_envelope(self, route: &str) -> Response {
        self.log_internal();
        let status = self.status_code();
        let errors = match &self {
            Self::Validation { errors } => Some(errors.clone()),
            Self::Conflict { field, value } => Some(vec![ValidationError::new(
                field.clone(),
                format!("value `{value}` already exists"),
            )]),
            _ => None,
        };
        ApiResponse::failure(route, self.user_message(), errors).into_response_with(status)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.into_envelope("unknown")
    }
}

/// The storage layer is the authority of record: constraint rejections it
/// raises are translated into the same error kinds the request-time
/// pre-checks produce.
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { field, value } => Self::Conflict { field, value },
            StoreError::ConstraintViolation { field, message } => Self::Validation {
                errors: vec![ValidationError::new(field, message)],
            },
            StoreError::UnknownEntity(name) => Self::Internal {
                message: "storage error".to_string(),
                internal: Some(format!("unknown entity `{name}`")),
            },
        }
    }
}
