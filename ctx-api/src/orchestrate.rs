//! The nine stable operations of the tool surface, each a plain
//! `async fn(&Principal, Input) -> ApiResult<Output>` independent of axum:
//! a thin HTTP handler calls into a testable function that does the actual
//! work.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ctx_auth::{resolve_author, AuditLog, AuditMode, AuditRecord as AuthAuditRecord, Capability};
use ctx_core::{
    compute_content_hash, AuthorType, Context, ContextId, ContextLifecycle, ContextType, CtxError,
    EntityIdType, ValidationError,
};
use ctx_embed::EmbeddingPipelineStatus;
use ctx_expand::{detect_relationships, expand_context};
use ctx_query::{execute_query, Backends, DispatchRequest, RankedHit};
use ctx_storage::{scratch_key, BackendAdapter, GraphQuery, Namespace, NamespaceHint, StoreItem};
use ctx_sync::{LockCoordinator, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::envelope::Warning;
use crate::error::{ApiError, ApiResult};
use crate::lookup::{
    GraphLookup, META_CONTENT, META_CONTEXT_TYPE, META_CREATED_AT, META_PROJECT_ID,
    META_QA_PARENT, META_SPRINT_NUMBER,
};
use crate::state::AppState;

fn parse_search_mode(raw: &str) -> Option<ctx_core::SearchMode> {
    use ctx_core::SearchMode::*;
    match raw.to_ascii_lowercase().as_str() {
        "vector" => Some(Vector),
        "graph" => Some(Graph),
        "text" => Some(Text),
        "kv" => Some(Kv),
        "hybrid" => Some(Hybrid),
        "auto" => Some(Auto),
        _ => None,
    }
}

fn text_of(content: &BTreeMap<String, serde_json::Value>) -> String {
    ["text", "title", "description"]
        .iter()
        .filter_map(|key| content.get(*key).and_then(|v| v.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn string_field(content: &BTreeMap<String, serde_json::Value>, key: &str) -> Option<String> {
    content.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

// ---------------------------------------------------------------------
// store_context
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StoreContextInput {
    #[serde(rename = "type")]
    pub context_type: String,
    pub content: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub author: Option<String>,
    pub author_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StoreContextOutput {
    pub id: ContextId,
    pub vector_id: Option<String>,
    pub graph_id: Option<String>,
    pub embedding_status: &'static str,
    pub relationships_created: usize,
    pub namespace: String,
    pub warnings: Vec<Warning>,
}

pub async fn store_context(
    state: &AppState,
    principal: &ctx_auth::Principal,
    input: StoreContextInput,
) -> ApiResult<StoreContextOutput> {
    principal.authorize(Capability::StoreContext)?;

    let context_type = ContextType::from_str(&input.context_type)
        .map_err(|_| ApiError::from(CtxError::Validation(ValidationError::InvalidValue {
            field: "type".to_string(),
            reason: format!("unrecognized context type '{}'", input.context_type),
        })))?;

    let requested_author_type = input
        .author_type
        .as_deref()
        .map(|s| if s.eq_ignore_ascii_case("agent") { AuthorType::Agent } else { AuthorType::Human });
    let (author, author_type) = resolve_author(principal, input.author, requested_author_type);

    let hint = NamespaceHint {
        project_id: string_field(&input.content, "project_id"),
        team_id: string_field(&input.content, "team_id"),
        user_id: string_field(&input.content, "user_id"),
    };
    let namespace = Namespace::assign(&hint);

    let lock_coordinator = LockCoordinator::new(&state.kv, RetryPolicy::default());
    let lease = lock_coordinator.acquire_default(namespace.as_str(), &author).await?;

    let result = store_context_locked(
        state,
        &author,
        author_type,
        context_type,
        input.content,
        input.metadata,
        namespace,
    )
    .await;

    lock_coordinator.release(&lease)?;
    result
}

async fn store_context_locked(
    state: &AppState,
    author: &str,
    author_type: AuthorType,
    context_type: ContextType,
    content: BTreeMap<String, serde_json::Value>,
    metadata: BTreeMap<String, serde_json::Value>,
    namespace: Namespace,
) -> ApiResult<StoreContextOutput> {
    let mut warnings = Vec::new();
    let id = ContextId::now_v7();
    let created_at = Utc::now();
    let text = text_of(&content);

    let embedding = match state.embedding.embed(&text).await {
        Ok(vector) => Some(vector),
        Err(err) => {
            warnings.push(Warning::new("embedding_failed", err.to_string()));
            None
        }
    };
    // `unavailable` means the pipeline itself never came up (failed
    // self-test); `failed` means a live pipeline could not produce or land
    // this particular vector. Finalized after the vector write below.
    let mut embedding_status = match &embedding {
        Some(_) => "completed",
        None if !state.embedding.status().self_test_ok => "unavailable",
        None => "failed",
    };

    let mut context = Context {
        id,
        context_type,
        content,
        metadata,
        author: author.to_string(),
        author_type,
        created_at,
        namespace: namespace.as_str().to_string(),
        embedding: embedding.clone(),
        vector_id: None,
        graph_id: None,
        deleted_at: None,
        purge_at: None,
        lifecycle: ContextLifecycle::Draft,
        content_hash: compute_content_hash(text.as_bytes()),
    };

    // Every index carries the same filterable metadata, so a filter
    // condition holds on whichever backend surfaces the hit; the graph
    // node additionally keeps the full content mapping.
    let mut index_metadata: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    index_metadata.insert(META_CONTEXT_TYPE.to_string(), serde_json::json!(context_type.to_string()));
    index_metadata.insert(META_CREATED_AT.to_string(), serde_json::json!(created_at.to_rfc3339()));
    index_metadata.insert("author".to_string(), serde_json::json!(author));
    index_metadata.insert("author_type".to_string(), serde_json::json!(author_type.to_string()));
    if let Some(project_id) = string_field(&context.content, "project_id") {
        index_metadata.insert(META_PROJECT_ID.to_string(), serde_json::json!(project_id));
    }
    if let Some(sprint_number) = string_field(&context.content, "sprint_number") {
        index_metadata.insert(META_SPRINT_NUMBER.to_string(), serde_json::json!(sprint_number));
    }
    for (key, value) in &context.metadata {
        index_metadata.insert(key.clone(), value.clone());
    }
    let mut graph_metadata = index_metadata.clone();
    graph_metadata.insert(
        META_CONTENT.to_string(),
        serde_json::to_value(&context.content).unwrap_or(serde_json::Value::Null),
    );

    let graph_item = StoreItem {
        id,
        namespace: context.namespace.clone(),
        text: text.clone(),
        embedding: None,
        metadata: graph_metadata,
        label: ctx_storage::NodeLabel::Context,
    };
    state.graph.store(&graph_item, Duration::from_millis(200)).await?;
    context.graph_id = Some(id.to_string());
    context.lifecycle = ContextLifecycle::Stored;

    if let Some(vector) = &embedding {
        let vector_item = StoreItem {
            id,
            namespace: context.namespace.clone(),
            text: text.clone(),
            embedding: Some(vector.data.clone()),
            metadata: index_metadata.clone(),
            label: ctx_storage::NodeLabel::Context,
        };
        match state.backends.vector.store(&vector_item, Duration::from_millis(100)).await {
            Ok(()) => {
                context.vector_id = Some(id.to_string());
                context.lifecycle = ContextLifecycle::Indexed;
            }
            Err(err) => {
                embedding_status = "failed";
                warnings.push(Warning::new("backend_unavailable", format!("vector write failed: {err}")));
            }
        }
    }

    let text_item = StoreItem {
        id,
        namespace: context.namespace.clone(),
        text: text.clone(),
        embedding: None,
        metadata: index_metadata,
        label: ctx_storage::NodeLabel::Context,
    };
    if let Err(err) = state.backends.text.store(&text_item, Duration::from_millis(20)).await {
        warnings.push(Warning::new("backend_unavailable", format!("text index write failed: {err}")));
    }

    let kv_key = format!("ctx:{id}");
    if let Err(err) = state.kv.set(&kv_key, id.to_string().as_bytes(), namespace.default_retention_ms()) {
        warnings.push(Warning::new("backend_unavailable", format!("kv write failed: {err}")));
    }

    state.event_log.append(
        "store_context",
        "store_context",
        Some(id),
        author.to_string(),
        context.namespace.clone(),
        ctx_sync::EventOutcome::Success,
    );

    // Each stitched unit is indexed under its own id so it never displaces
    // the parent's vector entry; the parent pointer travels as metadata and
    // the dispatcher collapses hits back onto the parent.
    if embedding.is_some() {
        for qa in expand_context(&context) {
            let stitched = qa.stitched_unit();
            let qa_vector = match state.embedding.embed(&stitched).await {
                Ok(vector) => vector,
                Err(err) => {
                    warnings.push(Warning::new("qa_pair_write_failed", err.to_string()));
                    continue;
                }
            };
            let mut qa_metadata = BTreeMap::new();
            qa_metadata.insert(META_QA_PARENT.to_string(), serde_json::json!(id.to_string()));
            let qa_item = StoreItem {
                id: ContextId::new(qa.id.as_uuid()),
                namespace: context.namespace.clone(),
                text: stitched,
                embedding: Some(qa_vector.data),
                metadata: qa_metadata,
                label: ctx_storage::NodeLabel::Context,
            };
            if let Err(err) = state.backends.vector.store(&qa_item, Duration::from_millis(100)).await {
                warnings.push(Warning::new("qa_pair_write_failed", err.to_string()));
            }
        }
    }

    let lookup = GraphLookup::new(state.graph.clone(), state.vector.clone());
    let (edges, stats) = detect_relationships(&context, &text, &lookup, &state.graph.edges_from(id));
    let mut relationships_created = 0;
    for edge in edges {
        if state.graph.add_edge(edge) {
            relationships_created += 1;
        }
    }
    if stats.duplicates_skipped > 0 {
        warnings.push(Warning::new(
            "relationship_duplicates_skipped",
            format!("{} duplicate relationship(s) skipped", stats.duplicates_skipped),
        ));
    }

    Ok(StoreContextOutput {
        id,
        vector_id: context.vector_id,
        graph_id: context.graph_id,
        embedding_status,
        relationships_created,
        namespace: context.namespace,
        warnings,
    })
}

// ---------------------------------------------------------------------
// retrieve_context
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RetrieveContextInput {
    pub query: String,
    #[serde(default)]
    pub search_mode: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub filters: Vec<ctx_core::FilterExpr>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub ranking_policy: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RetrieveContextOutput {
    pub results: Vec<RetrievedHit>,
    pub source_breakdown: BTreeMap<&'static str, usize>,
    pub backends_used: Vec<&'static str>,
    pub timings_ms: BTreeMap<&'static str, u64>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Serialize)]
pub struct RetrievedHit {
    pub id: ContextId,
    pub content: Option<serde_json::Value>,
    pub score: f32,
    pub sources: Vec<&'static str>,
}

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
enum SortBy {
    Timestamp,
    Relevance,
}

pub async fn retrieve_context(
    state: &AppState,
    principal: &ctx_auth::Principal,
    input: RetrieveContextInput,
) -> ApiResult<RetrieveContextOutput> {
    principal.authorize(Capability::RetrieveContext)?;

    if input.query.trim().is_empty() && input.filters.is_empty() {
        return Err(ApiError::validation("query must not be blank"));
    }

    let mut warnings = Vec::new();
    let requested_limit = input.limit.unwrap_or(DEFAULT_LIMIT);
    if requested_limit == 0 {
        return Ok(RetrieveContextOutput {
            results: Vec::new(),
            source_breakdown: BTreeMap::new(),
            backends_used: Vec::new(),
            timings_ms: BTreeMap::new(),
            warnings,
        });
    }
    let limit = if requested_limit > MAX_LIMIT {
        warnings.push(Warning::new(
            "limit_clamped",
            format!("requested limit {requested_limit} exceeds maximum {MAX_LIMIT}"),
        ));
        MAX_LIMIT
    } else {
        requested_limit
    };

    let search_mode = match input.search_mode.as_deref() {
        Some(raw) => parse_search_mode(raw).ok_or_else(|| ApiError::validation("unrecognized search_mode"))?,
        None => ctx_core::SearchMode::default(),
    };
    let sort_by = match input.sort_by.as_deref() {
        None | Some("timestamp") => SortBy::Timestamp,
        Some("relevance") => SortBy::Relevance,
        Some(_) => return Err(ApiError::validation("sort_by must be 'timestamp' or 'relevance'")),
    };

    // Filters address the metadata the store path writes; accept `type` as
    // the tool-facing alias for the stored `context_type` key.
    let filters: Vec<ctx_core::FilterExpr> = input
        .filters
        .into_iter()
        .map(|mut filter| {
            if filter.field == "type" {
                filter.field = META_CONTEXT_TYPE.to_string();
            }
            filter
        })
        .collect();

    // A blank query with filters is a pure filter scan: no text to match,
    // nothing to embed, so the vector/text backends sit this one out.
    let blank_query = input.query.trim().is_empty();
    let request = DispatchRequest {
        query_text: (!blank_query).then(|| input.query.clone()),
        query_vector: if blank_query {
            None
        } else {
            state.embedding.embed(&input.query).await.ok().map(|v| v.data)
        },
        search_mode,
        dispatch_policy: ctx_core::DispatchPolicy::default(),
        namespace: input.namespace,
        filters,
        limit,
    };

    let policy_name = input.ranking_policy.unwrap_or_else(|| state.config.ranking.default_policy.clone());
    let policy = state
        .config
        .ranking
        .policies
        .iter()
        .find(|p| p.name == policy_name)
        .cloned()
        .unwrap_or_default();

    let lookup = GraphLookup::new(state.graph.clone(), state.vector.clone());
    let backends: &Backends = &state.backends;
    let response = execute_query(
        &request,
        backends,
        &state.config.dispatch.per_backend_deadlines_ms,
        &lookup,
        &lookup,
        &lookup,
        &policy,
        Utc::now(),
    )
    .await?;

    let mut results: Vec<RetrievedHit> = response
        .hits
        .into_iter()
        .map(|hit: RankedHit| RetrievedHit {
            id: hit.id,
            content: lookup.content_of(hit.id),
            score: hit.explanation.final_score,
            sources: hit.sources,
        })
        .collect();
    if sort_by == SortBy::Timestamp {
        use ctx_query::CandidateFacts;
        results.sort_by(|a, b| {
            let at = lookup.created_at(a.id);
            let bt = lookup.created_at(b.id);
            bt.cmp(&at)
        });
    }

    Ok(RetrieveContextOutput {
        results,
        source_breakdown: response.dispatch.source_breakdown,
        backends_used: response.dispatch.backend_outcomes.keys().copied().collect(),
        timings_ms: response.dispatch.latencies_ms,
        warnings,
    })
}

// ---------------------------------------------------------------------
// query_graph
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct QueryGraphInput {
    pub start: ContextId,
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default)]
    pub relationship_type: Option<String>,
    /// Present only for write-gated graph mutations (role-checked below).
    #[serde(default)]
    pub write: bool,
}

fn default_max_hops() -> usize {
    2
}

#[derive(Debug, Serialize)]
pub struct QueryGraphOutput {
    pub results: Vec<ContextId>,
}

pub async fn query_graph(
    state: &AppState,
    principal: &ctx_auth::Principal,
    input: QueryGraphInput,
) -> ApiResult<QueryGraphOutput> {
    let capability = if input.write { Capability::QueryGraphWrite } else { Capability::QueryGraphRead };
    principal.authorize(capability)?;

    let relationship_filter = input
        .relationship_type
        .as_deref()
        .map(ctx_core::RelationshipType::from_str)
        .transpose()
        .map_err(|_| ApiError::validation("unrecognized relationship_type"))?;

    // Soft-deleted contexts stay visible here until purged; only retrieval
    // hides them.
    let query = GraphQuery { start: input.start, max_hops: input.max_hops, relationship_filter };
    let results = state.graph.traverse(&query);

    Ok(QueryGraphOutput { results })
}

// ---------------------------------------------------------------------
// update_scratchpad / get_agent_state
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct UpdateScratchpadInput {
    pub agent_id: String,
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub ttl: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateScratchpadOutput {
    pub ok: bool,
}

pub async fn update_scratchpad(
    state: &AppState,
    principal: &ctx_auth::Principal,
    input: UpdateScratchpadInput,
) -> ApiResult<UpdateScratchpadOutput> {
    principal.authorize(Capability::UpdateScratchpad)?;

    let policy = match &input.ttl {
        Some(name) => Some(
            parse_ttl_policy(name).ok_or_else(|| ApiError::validation("unrecognized ttl policy"))?,
        ),
        None => Some(ctx_core::TtlPolicy::Scratchpad),
    };

    let gate = ctx_sync::TtlGate::new(&state.kv, state.config.ttl.clone(), ctx_sync::MissingTtlBehavior::AutoCorrect);
    let key = scratch_key(&input.agent_id, &input.key);
    let value = serde_json::to_vec(&input.value).map_err(|e| ApiError::validation(e.to_string()))?;
    gate.set(&key, &value, policy)?;
    Ok(UpdateScratchpadOutput { ok: true })
}

fn parse_ttl_policy(name: &str) -> Option<ctx_core::TtlPolicy> {
    match name {
        "scratchpad" => Some(ctx_core::TtlPolicy::Scratchpad),
        "session" => Some(ctx_core::TtlPolicy::Session),
        "cache" => Some(ctx_core::TtlPolicy::Cache),
        "temporary" => Some(ctx_core::TtlPolicy::Temporary),
        "persistent" => Some(ctx_core::TtlPolicy::Persistent),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
pub struct GetAgentStateInput {
    pub agent_id: String,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct GetAgentStateOutput {
    pub value: Option<serde_json::Value>,
    pub keys: Option<Vec<String>>,
}

pub async fn get_agent_state(
    state: &AppState,
    principal: &ctx_auth::Principal,
    input: GetAgentStateInput,
) -> ApiResult<GetAgentStateOutput> {
    principal.authorize(Capability::GetAgentState)?;

    match input.key {
        Some(key) => {
            let raw = state
                .kv
                .get(&scratch_key(&input.agent_id, &key))
                .map_err(|e| ApiError::from(CtxError::from(e)))?;
            let value = raw
                .map(|bytes| serde_json::from_slice(&bytes))
                .transpose()
                .map_err(|e| ApiError::new("internal", e.to_string()))?;
            Ok(GetAgentStateOutput { value, keys: None })
        }
        None => {
            let prefix = format!("scratch:{}:", input.agent_id);
            let keys = state
                .kv
                .keys_with_prefix(&prefix)
                .map_err(|e| ApiError::from(CtxError::from(e)))?;
            Ok(GetAgentStateOutput { value: None, keys: Some(keys) })
        }
    }
}

// ---------------------------------------------------------------------
// delete_context (hard) / forget_context (soft)
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DeleteContextInput {
    pub context_id: ContextId,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteContextOutput {
    pub ok: bool,
    pub audit_id: String,
}

pub async fn delete_context(
    state: &AppState,
    principal: &ctx_auth::Principal,
    input: DeleteContextInput,
) -> ApiResult<DeleteContextOutput> {
    principal.authorize(Capability::DeleteContext)?;

    // The backend delete itself is idempotent; a missing target is the
    // tool's own not_found, checked before the audit record is written.
    if !state.graph.contains(input.context_id) {
        return Err(ApiError::from(CtxError::Storage(ctx_core::StorageError::NotFound {
            entity_type: ctx_core::EntityType::Context,
            id: input.context_id.to_string(),
        })));
    }

    let audit_id = ctx_core::AuditId::now_v7();
    let record = AuthAuditRecord {
        id: audit_id,
        context_id: input.context_id,
        actor: principal.id.clone(),
        actor_type: principal.author_type(),
        role: principal.role,
        mode: AuditMode::Hard,
        reason: Some(input.reason),
        created_at: Utc::now(),
    };
    state.audit_log.record(record, Duration::from_millis(200)).await?;

    state.graph.delete(input.context_id, Duration::from_millis(200)).await?;

    Ok(DeleteContextOutput { ok: true, audit_id: audit_id.to_string() })
}

#[derive(Debug, Deserialize)]
pub struct ForgetContextInput {
    pub context_id: ContextId,
    pub retention_days: i64,
}

#[derive(Debug, Serialize)]
pub struct ForgetContextOutput {
    pub ok: bool,
    pub purge_at: DateTime<Utc>,
}

pub async fn forget_context(
    state: &AppState,
    principal: &ctx_auth::Principal,
    input: ForgetContextInput,
) -> ApiResult<ForgetContextOutput> {
    principal.authorize(Capability::ForgetContext)?;

    if !(1..=90).contains(&input.retention_days) {
        return Err(ApiError::validation("retention_days must be between 1 and 90"));
    }

    let record = AuthAuditRecord {
        id: ctx_core::AuditId::now_v7(),
        context_id: input.context_id,
        actor: principal.id.clone(),
        actor_type: principal.author_type(),
        role: principal.role,
        mode: AuditMode::Soft,
        reason: None,
        created_at: Utc::now(),
    };
    state.audit_log.record(record, Duration::from_millis(200)).await?;

    state.graph.soft_delete(input.context_id)?;
    let purge_at = Utc::now() + chrono::Duration::days(input.retention_days);

    Ok(ForgetContextOutput { ok: true, purge_at })
}

// ---------------------------------------------------------------------
// health_detailed
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthDetailedOutput {
    pub services: BTreeMap<&'static str, ctx_core::HealthCheck>,
    pub embedding_pipeline: EmbeddingPipelineStatus,
}

pub async fn health_detailed(state: &AppState, principal: &ctx_auth::Principal) -> ApiResult<HealthDetailedOutput> {
    principal.authorize(Capability::Health)?;

    let mut services = BTreeMap::new();
    services.insert("vector", state.backends.vector.health().await);
    services.insert("graph", state.backends.graph.health().await);
    services.insert("text", state.backends.text.health().await);
    services.insert("kv", state.backends.kv.health().await);

    Ok(HealthDetailedOutput { services, embedding_pipeline: state.embedding.status() })
}
