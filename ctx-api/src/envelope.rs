//! The response envelope every tool endpoint returns:
//! `{success, data, warnings, error, trace_id, timings_ms}`.

use crate::error::ApiError;
use axum::{response::IntoResponse, Json};
use serde::Serialize;
use std::collections::BTreeMap;

/// A non-fatal problem surfaced alongside a successful response, e.g. a
/// backend that degraded during retrieval or a clamped `limit`.
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: String,
    pub message: String,
}

impl Warning {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), message: message.into() }
    }
}

/// Per-request timing breakdown: total wall clock plus one entry per
/// backend that was consulted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Timings {
    pub total: u64,
    pub per_backend: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub warnings: Vec<Warning>,
    pub error: Option<ApiError>,
    pub trace_id: String,
    pub timings_ms: Timings,
}

impl<T> Envelope<T> {
    pub fn ok(data: T, trace_id: String, warnings: Vec<Warning>, timings_ms: Timings) -> Self {
        Self { success: true, data: Some(data), warnings, error: None, trace_id, timings_ms }
    }

    pub fn err(error: ApiError) -> Self {
        Self {
            success: false,
            data: None,
            warnings: Vec::new(),
            error: Some(error),
            trace_id: String::new(),
            timings_ms: Timings::default(),
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}
