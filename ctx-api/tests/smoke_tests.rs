//! End-to-end scenarios exercised through the tool surface, without HTTP:
//! each test drives the same `orchestrate` functions the axum handlers call.

mod support;

use ctx_api::orchestrate::{
    self, DeleteContextInput, ForgetContextInput, GetAgentStateInput, QueryGraphInput,
    UpdateScratchpadInput,
};
use ctx_auth::Principal;
use ctx_core::Role;
use ctx_storage::NodeLabel;
use support::{retrieve_input, store_input, store_input_with, test_state};

#[tokio::test]
async fn stored_fact_is_recalled_by_a_paraphrased_question() {
    let (state, _dir) = test_state().await;
    let writer = Principal { id: "agent-1".to_string(), role: Role::Writer, is_agent: true };

    let stored = orchestrate::store_context(&state, &writer, store_input("log", "My name is Matt"))
        .await
        .unwrap();
    assert_eq!(stored.embedding_status, "completed");

    let mut input = retrieve_input("What's my name?");
    input.search_mode = Some("hybrid".to_string());
    input.limit = Some(5);
    let retrieved = orchestrate::retrieve_context(&state, &writer, input).await.unwrap();

    assert!(!retrieved.results.is_empty());
    let first = &retrieved.results[0];
    assert_eq!(first.id, stored.id);
    let content = first.content.as_ref().expect("stored content should be returned");
    assert!(content.to_string().contains("Matt"));
    assert!(
        retrieved.source_breakdown.contains_key("vector")
            || retrieved.source_breakdown.contains_key("text")
    );
}

/// A vector backend that refuses every write and search.
struct UnavailableVector;

#[async_trait::async_trait]
impl ctx_storage::BackendAdapter for UnavailableVector {
    fn name(&self) -> &'static str {
        "vector"
    }
    async fn store(
        &self,
        _item: &ctx_storage::StoreItem,
        _deadline: std::time::Duration,
    ) -> ctx_core::CtxResult<()> {
        Err(ctx_core::CtxError::Storage(ctx_core::StorageError::BackendUnavailable {
            backend: "vector".to_string(),
            reason: "simulated outage".to_string(),
        }))
    }
    async fn search(
        &self,
        _query: &ctx_storage::SearchQuery,
        _deadline: std::time::Duration,
    ) -> ctx_core::CtxResult<Vec<ctx_storage::SearchHit>> {
        Err(ctx_core::CtxError::Storage(ctx_core::StorageError::BackendUnavailable {
            backend: "vector".to_string(),
            reason: "simulated outage".to_string(),
        }))
    }
    async fn delete(
        &self,
        _id: ctx_core::ContextId,
        _deadline: std::time::Duration,
    ) -> ctx_core::CtxResult<()> {
        Ok(())
    }
    async fn health(&self) -> ctx_core::HealthCheck {
        ctx_core::HealthCheck::unhealthy("vector", "simulated outage")
    }
}

#[tokio::test]
async fn write_survives_an_unavailable_vector_backend() {
    let (mut state, _dir) = test_state().await;
    state.backends = std::sync::Arc::new(ctx_query::Backends {
        vector: std::sync::Arc::new(UnavailableVector),
        graph: state.graph.clone(),
        text: state.backends.text.clone(),
        kv: state.backends.kv.clone(),
    });
    let writer = Principal { id: "agent-1".to_string(), role: Role::Writer, is_agent: true };

    let stored = orchestrate::store_context(
        &state,
        &writer,
        store_input("design", "adopt parallel dispatch"),
    )
    .await
    .unwrap();

    assert_eq!(stored.embedding_status, "failed");
    assert!(stored.vector_id.is_none());
    assert!(stored.graph_id.is_some());
    assert!(stored.warnings.iter().any(|w| w.kind == "backend_unavailable"));
}

#[tokio::test]
async fn consecutive_sprints_are_linked_in_both_directions() {
    let (state, _dir) = test_state().await;
    let writer = Principal { id: "agent-1".to_string(), role: Role::Writer, is_agent: true };

    let first = orchestrate::store_context(&state, &writer, store_input("sprint", "sprint one"))
        .await
        .unwrap();
    let second = orchestrate::store_context(&state, &writer, store_input("sprint", "sprint two"))
        .await
        .unwrap();
    assert!(second.relationships_created >= 2);

    let followed = orchestrate::query_graph(
        &state,
        &writer,
        QueryGraphInput {
            start: first.id,
            max_hops: 1,
            relationship_type: Some("FOLLOWED_BY".to_string()),
            write: false,
        },
    )
    .await
    .unwrap();
    assert!(followed.results.contains(&second.id));

    let preceded = orchestrate::query_graph(
        &state,
        &writer,
        QueryGraphInput {
            start: second.id,
            max_hops: 1,
            relationship_type: Some("PRECEDED_BY".to_string()),
            write: false,
        },
    )
    .await
    .unwrap();
    assert!(preceded.results.contains(&first.id));
}

#[tokio::test]
async fn agents_cannot_hard_delete_even_as_admin() {
    let (state, _dir) = test_state().await;
    let writer = Principal { id: "agent-1".to_string(), role: Role::Writer, is_agent: true };
    let agent_admin = Principal { id: "agent-admin".to_string(), role: Role::Admin, is_agent: true };
    let human_admin = Principal { id: "admin-1".to_string(), role: Role::Admin, is_agent: false };

    let stored = orchestrate::store_context(&state, &writer, store_input("log", "to be deleted"))
        .await
        .unwrap();

    let denied = orchestrate::delete_context(
        &state,
        &agent_admin,
        DeleteContextInput { context_id: stored.id, reason: "cleanup".to_string() },
    )
    .await
    .unwrap_err();
    assert_eq!(denied.kind, "auth_forbidden");

    let deleted = orchestrate::delete_context(
        &state,
        &human_admin,
        DeleteContextInput { context_id: stored.id, reason: "cleanup".to_string() },
    )
    .await
    .unwrap();
    assert!(deleted.ok);

    let audits = state.graph.nodes_with_label(NodeLabel::Audit);
    assert!(!audits.is_empty(), "hard delete must leave an audit node behind");
}

#[tokio::test]
async fn namespace_restricted_retrieval_sees_only_that_namespace() {
    let (state, _dir) = test_state().await;
    let writer = Principal { id: "agent-1".to_string(), role: Role::Writer, is_agent: true };

    let ours = orchestrate::store_context(
        &state,
        &writer,
        store_input_with("log", "the deploy window opens friday", &[("user_id", "u1")]),
    )
    .await
    .unwrap();
    let theirs = orchestrate::store_context(
        &state,
        &writer,
        store_input_with("log", "the deploy window opens friday", &[("user_id", "u2")]),
    )
    .await
    .unwrap();
    assert_eq!(ours.namespace, "/user/u1/");
    assert_eq!(theirs.namespace, "/user/u2/");

    let mut input = retrieve_input("deploy window");
    input.search_mode = Some("hybrid".to_string());
    input.namespace = Some("/user/u1/".to_string());
    let retrieved = orchestrate::retrieve_context(&state, &writer, input).await.unwrap();

    assert!(retrieved.results.iter().any(|hit| hit.id == ours.id));
    assert!(retrieved.results.iter().all(|hit| hit.id != theirs.id));
}

#[tokio::test]
async fn hybrid_source_breakdown_sums_to_the_result_count() {
    let (state, _dir) = test_state().await;
    let writer = Principal { id: "agent-1".to_string(), role: Role::Writer, is_agent: true };

    for text in [
        "token bucket rate limiter design",
        "circuit breaker for the outbound client",
        "retry budget and backoff policy",
    ] {
        orchestrate::store_context(&state, &writer, store_input("design", text)).await.unwrap();
    }

    let mut input = retrieve_input("rate limiter");
    input.search_mode = Some("hybrid".to_string());
    input.limit = Some(10);
    let retrieved = orchestrate::retrieve_context(&state, &writer, input).await.unwrap();

    assert!(!retrieved.results.is_empty());
    assert_eq!(
        retrieved.source_breakdown.values().sum::<usize>(),
        retrieved.results.len()
    );
    assert!(retrieved.backends_used.contains(&"vector"));
    assert!(retrieved.backends_used.contains(&"text"));
}

#[tokio::test]
async fn scratchpad_roundtrips_through_agent_state() {
    let (state, _dir) = test_state().await;
    let writer = Principal { id: "agent-1".to_string(), role: Role::Writer, is_agent: true };

    orchestrate::update_scratchpad(
        &state,
        &writer,
        UpdateScratchpadInput {
            agent_id: "agent-1".to_string(),
            key: "current_task".to_string(),
            value: serde_json::json!({"step": 3}),
            ttl: Some("scratchpad".to_string()),
        },
    )
    .await
    .unwrap();

    let single = orchestrate::get_agent_state(
        &state,
        &writer,
        GetAgentStateInput { agent_id: "agent-1".to_string(), key: Some("current_task".to_string()) },
    )
    .await
    .unwrap();
    assert_eq!(single.value, Some(serde_json::json!({"step": 3})));

    let listing = orchestrate::get_agent_state(
        &state,
        &writer,
        GetAgentStateInput { agent_id: "agent-1".to_string(), key: None },
    )
    .await
    .unwrap();
    let keys = listing.keys.unwrap();
    assert!(keys.iter().any(|k| k.contains("current_task")));
}

#[tokio::test]
async fn forgotten_context_is_hidden_from_retrieval_but_not_the_graph() {
    let (state, _dir) = test_state().await;
    let writer = Principal { id: "agent-1".to_string(), role: Role::Writer, is_agent: true };

    let first = orchestrate::store_context(&state, &writer, store_input("sprint", "sprint alpha"))
        .await
        .unwrap();
    let second = orchestrate::store_context(&state, &writer, store_input("sprint", "sprint beta"))
        .await
        .unwrap();

    let forgotten = orchestrate::forget_context(
        &state,
        &writer,
        ForgetContextInput { context_id: second.id, retention_days: 30 },
    )
    .await
    .unwrap();
    assert!(forgotten.ok);
    assert!(forgotten.purge_at > chrono::Utc::now());

    let mut input = retrieve_input("sprint beta");
    input.search_mode = Some("hybrid".to_string());
    let retrieved = orchestrate::retrieve_context(&state, &writer, input).await.unwrap();
    assert!(retrieved.results.iter().all(|hit| hit.id != second.id));

    // The graph surface still sees the soft-deleted context until purge.
    let traversal = orchestrate::query_graph(
        &state,
        &writer,
        QueryGraphInput { start: first.id, max_hops: 1, relationship_type: None, write: false },
    )
    .await
    .unwrap();
    assert!(traversal.results.contains(&second.id));
}

#[tokio::test]
async fn health_detailed_reports_every_backend_and_the_pipeline() {
    let (state, _dir) = test_state().await;
    let reader = Principal { id: "reader-1".to_string(), role: Role::Reader, is_agent: false };

    let health = orchestrate::health_detailed(&state, &reader).await.unwrap();
    for backend in ["vector", "graph", "text", "kv"] {
        assert!(health.services.contains_key(backend));
    }
    assert!(health.embedding_pipeline.self_test_ok);
}
