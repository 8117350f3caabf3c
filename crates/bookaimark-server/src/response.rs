//! # Response Envelope
//!
//! Every route answers with the same JSON shape:
//!
//! ```text
//! { "success": true,  "data": ..., "count"?: n, "message"?: "...", "meta"?: {...} }
//! { "success": false, "error": "...", "details"?: ..., "code"?: "NOT_FOUND" }
//! ```
//!
//! Handlers return [`ApiResult`]. Library errors convert into [`ApiError`] by
//! category, extractor rejections become validation errors, and panics are
//! caught by the router's panic layer and rendered through [`handle_panic`], so
//! nothing leaves the server unformatted.
//!
//! Client errors (400, 401, 403, 404, 409) are not logged as errors; anything
//! else is logged at `error` when the response is rendered.

use std::any::Any;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bookaimark::error::BookmarkError;
use serde::Serialize;
use serde_json::Value;

pub type ApiResult = Result<Response, ApiError>;

#[derive(Debug, Clone)]
pub struct SuccessOptions {
    pub message: Option<String>,
    pub meta: Option<Value>,
    pub count: Option<usize>,
    pub status: StatusCode,
}

impl Default for SuccessOptions {
    fn default() -> Self {
        Self {
            message: None,
            meta: None,
            count: None,
            status: StatusCode::OK,
        }
    }
}

impl SuccessOptions {
    pub fn created() -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Default::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

#[derive(Serialize)]
struct SuccessBody<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<Value>,
}

pub fn success<T: Serialize>(data: T, options: SuccessOptions) -> Response {
    let body = SuccessBody {
        success: true,
        data,
        count: options.count,
        message: options.message,
        meta: options.meta,
    };
    (options.status, Json(body)).into_response()
}

/// `success` with default options.
pub fn ok<T: Serialize>(data: T) -> Response {
    success(data, SuccessOptions::default())
}

/// A list with its length in `count`, repeated in `meta.count`.
pub fn list<T: Serialize>(items: Vec<T>) -> Response {
    let count = items.len();
    success(
        items,
        SuccessOptions::default()
            .count(count)
            .meta(serde_json::json!({ "count": count })),
    )
}

#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<Value>,
    pub code: Option<&'static str>,
    /// Log at `error` when rendered.
    pub log: bool,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
            code: None,
            log: !status.is_client_error(),
        }
    }

    pub fn validation_error(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error).with_code("VALIDATION_ERROR")
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error).with_code("NOT_FOUND")
    }

    pub fn unauthorized(error: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error).with_code("UNAUTHORIZED")
    }

    pub fn forbidden(error: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, error).with_code("FORBIDDEN")
    }

    pub fn conflict(error: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, error).with_code("CONFLICT")
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error).with_code("INTERNAL_ERROR")
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn without_logging(mut self) -> Self {
        self.log = false;
        self
    }

    /// Duplicate names on some routes are plain validation failures.
    pub fn conflict_as_validation(self) -> Self {
        if self.status == StatusCode::CONFLICT {
            Self {
                status: StatusCode::BAD_REQUEST,
                code: Some("VALIDATION_ERROR"),
                ..self
            }
        } else {
            self
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.log {
            tracing::error!(
                status = self.status.as_u16(),
                code = self.code.unwrap_or_default(),
                error = %self.error,
                "request failed"
            );
        }
        let body = ErrorBody {
            success: false,
            error: &self.error,
            details: self.details.as_ref(),
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<BookmarkError> for ApiError {
    fn from(err: BookmarkError) -> Self {
        match err {
            BookmarkError::Validation(message) => Self::validation_error(message),
            BookmarkError::NotFound(message) => Self::not_found(message),
            BookmarkError::Conflict(message) => Self::conflict(message),
            BookmarkError::AllBackendsFailed(messages) => {
                Self::internal("Failed to save setting").with_details(serde_json::json!(messages))
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation_error("Invalid request body").with_details(Value::String(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation_error("Invalid query parameters")
            .with_details(Value::String(rejection.body_text()))
    }
}

/// Renders a caught panic as a generic 500 envelope.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "handler panicked");
    ApiError::internal("Internal server error")
        .without_logging()
        .into_response()
}
