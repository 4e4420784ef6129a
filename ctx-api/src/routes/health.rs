//! Liveness and detailed health endpoints.

use axum::{extract::State, routing::get, Json, Router};
use ctx_core::{HealthCheck, HealthStatus};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct LivenessResponse {
    status: &'static str,
    uptime_seconds: u64,
}

async fn liveness(State(state): State<AppState>) -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "ok", uptime_seconds: state.start_time.elapsed().as_secs() })
}

#[derive(Debug, Serialize)]
struct DetailedHealthResponse {
    status: HealthStatus,
    services: BTreeMap<&'static str, HealthCheck>,
    embedding_pipeline: ctx_embed::EmbeddingPipelineStatus,
    uptime_seconds: u64,
}

/// Aggregates every backend's [`HealthCheck`] plus the embedding pipeline's
/// self-test status into one `health_detailed` view. Overall status is the
/// worst of its parts: any `Unhealthy` backend makes the whole service
/// unhealthy, any `Degraded` backend (or a failed self-test) makes it
/// degraded.
async fn detailed(State(state): State<AppState>) -> Json<DetailedHealthResponse> {
    let mut services = BTreeMap::new();
    services.insert("vector", state.backends.vector.health().await);
    services.insert("graph", state.backends.graph.health().await);
    services.insert("text", state.backends.text.health().await);
    services.insert("kv", state.backends.kv.health().await);

    let embedding_pipeline = state.embedding.status();

    let mut status = HealthStatus::Healthy;
    for check in services.values() {
        match check.status {
            HealthStatus::Unhealthy => status = HealthStatus::Unhealthy,
            HealthStatus::Degraded if status != HealthStatus::Unhealthy => status = HealthStatus::Degraded,
            _ => {}
        }
    }
    if !embedding_pipeline.self_test_ok && status == HealthStatus::Healthy {
        status = HealthStatus::Degraded;
    }

    Json(DetailedHealthResponse {
        status,
        services,
        embedding_pipeline,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(liveness)).route("/health/detailed", get(detailed))
}
