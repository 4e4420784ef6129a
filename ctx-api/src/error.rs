//! API error envelope.
//!
//! The error kind set is not hand-enumerated: `ApiError::kind` is always
//! [`CtxError::kind`], the same abstract taxonomy every other crate
//! already reports through. `status_code` is the one place that taxonomy
//! gets translated into a transport concept.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use ctx_core::CtxError;
use serde::Serialize;
use std::fmt;

/// Structured error carried in the response envelope's `error` field.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation", message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new("auth_required", message)
    }

    /// HTTP status for this error's abstract kind: 401 missing or unknown
    /// auth, 403 insufficient capability, 429 rate-limit.
    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            "validation" => StatusCode::BAD_REQUEST,
            "auth_required" => StatusCode::UNAUTHORIZED,
            "auth_forbidden" => StatusCode::FORBIDDEN,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "not_found" => StatusCode::NOT_FOUND,
            "backend_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            "conflict" => StatusCode::CONFLICT,
            "partial_success" => StatusCode::OK,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CtxError> for ApiError {
    fn from(err: CtxError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = crate::envelope::Envelope::<()>::err(self);
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
