//! The nine-tool catalog and one thin axum handler per tool: every handler
//! extracts a [`PrincipalExtractor`], deserializes the request body into
//! the matching `orchestrate` input type, calls the testable `orchestrate`
//! function, and wraps the result in an [`Envelope`].

use std::time::Instant;

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;

use crate::envelope::{Envelope, Timings};
use crate::error::ApiResult;
use crate::middleware::auth::PrincipalExtractor;
use crate::orchestrate::{self, *};
use crate::state::AppState;

/// One entry in the static tool catalog the `tools` operation returns.
/// Availability is computed at request time from live backend health, not
/// baked into the static table.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required_role: &'static str,
}

pub static TOOL_CATALOG: &[ToolSpec] = &[
    ToolSpec {
        name: "store_context",
        description: "Persist a new context entry, expanding it into Q&A pairs and detecting relationships to existing entries.",
        required_role: "writer",
    },
    ToolSpec {
        name: "retrieve_context",
        description: "Search across vector, graph, text, and KV backends and return ranked, deduplicated hits.",
        required_role: "reader",
    },
    ToolSpec {
        name: "query_graph",
        description: "Traverse the relationship graph from a starting context, optionally filtered by relationship type.",
        required_role: "reader",
    },
    ToolSpec {
        name: "update_scratchpad",
        description: "Write a TTL-bounded key/value entry to an agent's scratchpad.",
        required_role: "writer",
    },
    ToolSpec {
        name: "get_agent_state",
        description: "Read a single scratchpad key, or list an agent's scratchpad keys, with no search involved.",
        required_role: "reader",
    },
    ToolSpec {
        name: "delete_context",
        description: "Hard-delete a context. Requires a human principal; audited before the delete executes.",
        required_role: "admin",
    },
    ToolSpec {
        name: "forget_context",
        description: "Soft-delete a context with a bounded retention window before purge.",
        required_role: "writer",
    },
    ToolSpec {
        name: "tools",
        description: "List the tool catalog, reflecting current backend availability.",
        required_role: "guest",
    },
    ToolSpec {
        name: "health_detailed",
        description: "Report per-backend health and embedding pipeline status.",
        required_role: "guest",
    },
];

#[derive(Debug, Serialize)]
pub struct ToolCatalogEntry {
    #[serde(flatten)]
    pub spec: ToolSpec,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct ToolCatalogOutput {
    pub tools: Vec<ToolCatalogEntry>,
}

/// Runs `body` and wraps its outcome in an [`Envelope`], timing the call.
/// Every handler below is this one shape: extract principal, deserialize
/// input, call an `orchestrate` function, envelope the result.
fn envelope_of<T: Serialize>(started: Instant, result: ApiResult<T>) -> Envelope<T> {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(data) => Envelope::ok(
            data,
            uuid::Uuid::new_v4().to_string(),
            Vec::new(),
            Timings { total: elapsed_ms, per_backend: Default::default() },
        ),
        Err(err) => Envelope::err(err),
    }
}

async fn store_context_handler(
    State(state): State<AppState>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Json(input): Json<StoreContextInput>,
) -> Json<Envelope<StoreContextOutput>> {
    let started = Instant::now();
    Json(envelope_of(started, orchestrate::store_context(&state, &principal, input).await))
}

async fn retrieve_context_handler(
    State(state): State<AppState>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Json(input): Json<RetrieveContextInput>,
) -> Json<Envelope<RetrieveContextOutput>> {
    let started = Instant::now();
    Json(envelope_of(started, orchestrate::retrieve_context(&state, &principal, input).await))
}

async fn query_graph_handler(
    State(state): State<AppState>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Json(input): Json<QueryGraphInput>,
) -> Json<Envelope<QueryGraphOutput>> {
    let started = Instant::now();
    Json(envelope_of(started, orchestrate::query_graph(&state, &principal, input).await))
}

async fn update_scratchpad_handler(
    State(state): State<AppState>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Json(input): Json<UpdateScratchpadInput>,
) -> Json<Envelope<UpdateScratchpadOutput>> {
    let started = Instant::now();
    Json(envelope_of(started, orchestrate::update_scratchpad(&state, &principal, input).await))
}

async fn get_agent_state_handler(
    State(state): State<AppState>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Json(input): Json<GetAgentStateInput>,
) -> Json<Envelope<GetAgentStateOutput>> {
    let started = Instant::now();
    Json(envelope_of(started, orchestrate::get_agent_state(&state, &principal, input).await))
}

async fn delete_context_handler(
    State(state): State<AppState>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Json(input): Json<DeleteContextInput>,
) -> Json<Envelope<DeleteContextOutput>> {
    let started = Instant::now();
    Json(envelope_of(started, orchestrate::delete_context(&state, &principal, input).await))
}

async fn forget_context_handler(
    State(state): State<AppState>,
    PrincipalExtractor(principal): PrincipalExtractor,
    Json(input): Json<ForgetContextInput>,
) -> Json<Envelope<ForgetContextOutput>> {
    let started = Instant::now();
    Json(envelope_of(started, orchestrate::forget_context(&state, &principal, input).await))
}

async fn health_detailed_handler(
    State(state): State<AppState>,
    PrincipalExtractor(principal): PrincipalExtractor,
) -> Json<Envelope<HealthDetailedOutput>> {
    let started = Instant::now();
    Json(envelope_of(started, orchestrate::health_detailed(&state, &principal).await))
}

/// The `tools` catalog itself: requires only [`ctx_auth::Capability::Tools`],
/// which every role (including guest) holds. Availability is derived from
/// the same backend health checks `health_detailed` reports.
async fn tools_catalog_handler(
    State(state): State<AppState>,
    PrincipalExtractor(principal): PrincipalExtractor,
) -> Json<Envelope<ToolCatalogOutput>> {
    let started = Instant::now();
    let result: ApiResult<ToolCatalogOutput> = async {
        principal.authorize(ctx_auth::Capability::Tools)?;
        let health = orchestrate::health_detailed(&state, &principal).await;
        let backends_up = health
            .as_ref()
            .map(|h| h.services.values().all(|c| c.status != ctx_core::HealthStatus::Unhealthy))
            .unwrap_or(false);
        let tools = TOOL_CATALOG
            .iter()
            .map(|spec| ToolCatalogEntry {
                spec: spec.clone(),
                available: if spec.name == "tools" { true } else { backends_up },
            })
            .collect();
        Ok(ToolCatalogOutput { tools })
    }
    .await;
    Json(envelope_of(started, result))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tools/store_context", post(store_context_handler))
        .route("/tools/retrieve_context", post(retrieve_context_handler))
        .route("/tools/query_graph", post(query_graph_handler))
        .route("/tools/update_scratchpad", post(update_scratchpad_handler))
        .route("/tools/get_agent_state", post(get_agent_state_handler))
        .route("/tools/delete_context", post(delete_context_handler))
        .route("/tools/forget_context", post(forget_context_handler))
        .route("/tools/tools", post(tools_catalog_handler))
        .route("/tools/health_detailed", post(health_detailed_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_all_nine_tools() {
        assert_eq!(TOOL_CATALOG.len(), 9);
        assert!(TOOL_CATALOG.iter().any(|t| t.name == "store_context"));
        assert!(TOOL_CATALOG.iter().any(|t| t.name == "health_detailed"));
    }
}
