//! Boundary behaviors of the tool surface: limit clamping, validation
//! short-circuits, and role checks at the operation entry points.

mod support;

use ctx_api::orchestrate::{self, ForgetContextInput, StoreContextInput};
use ctx_auth::Principal;
use ctx_core::{EntityIdType, Role};
use support::{retrieve_input, store_input, test_state};

fn writer() -> Principal {
    Principal { id: "agent-1".to_string(), role: Role::Writer, is_agent: true }
}

fn guest() -> Principal {
    Principal { id: "guest-1".to_string(), role: Role::Guest, is_agent: false }
}

#[tokio::test]
async fn limit_zero_returns_empty_results_without_error() {
    let (state, _dir) = test_state().await;
    orchestrate::store_context(&state, &writer(), store_input("log", "something stored"))
        .await
        .unwrap();

    let mut input = retrieve_input("something");
    input.limit = Some(0);
    let out = orchestrate::retrieve_context(&state, &writer(), input).await.unwrap();
    assert!(out.results.is_empty());
    assert!(out.warnings.is_empty());
}

#[tokio::test]
async fn oversized_limit_is_clamped_with_a_warning() {
    let (state, _dir) = test_state().await;
    orchestrate::store_context(&state, &writer(), store_input("log", "something stored"))
        .await
        .unwrap();

    let mut input = retrieve_input("something");
    input.limit = Some(1000);
    let out = orchestrate::retrieve_context(&state, &writer(), input).await.unwrap();
    assert!(out.warnings.iter().any(|w| w.kind == "limit_clamped"));
}

#[tokio::test]
async fn whitespace_only_query_is_a_validation_error() {
    let (state, _dir) = test_state().await;
    let err = orchestrate::retrieve_context(&state, &writer(), retrieve_input("   \t"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, "validation");
}

#[tokio::test]
async fn unknown_context_type_is_rejected_before_any_write() {
    let (state, _dir) = test_state().await;
    let err = orchestrate::store_context(&state, &writer(), store_input("migration", "x"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, "validation");
    assert!(state.graph.context_nodes().is_empty(), "no side effects on validation failure");
}

#[tokio::test]
async fn unknown_search_mode_is_rejected() {
    let (state, _dir) = test_state().await;
    let mut input = retrieve_input("anything");
    input.search_mode = Some("telepathy".to_string());
    let err = orchestrate::retrieve_context(&state, &writer(), input).await.unwrap_err();
    assert_eq!(err.kind, "validation");
}

#[tokio::test]
async fn retention_days_outside_one_to_ninety_is_rejected() {
    let (state, _dir) = test_state().await;
    let stored = orchestrate::store_context(&state, &writer(), store_input("log", "x"))
        .await
        .unwrap();

    for days in [0, 91] {
        let err = orchestrate::forget_context(
            &state,
            &writer(),
            ForgetContextInput { context_id: stored.id, retention_days: days },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, "validation");
    }
}

#[tokio::test]
async fn type_filter_narrows_results_to_the_requested_type() {
    let (state, _dir) = test_state().await;
    let design = orchestrate::store_context(&state, &writer(), store_input("design", "retry budget policy"))
        .await
        .unwrap();
    let log = orchestrate::store_context(&state, &writer(), store_input("log", "retry budget policy"))
        .await
        .unwrap();

    let mut input = retrieve_input("retry budget");
    input.search_mode = Some("hybrid".to_string());
    input.filters = vec![ctx_core::FilterExpr::eq("type", serde_json::json!("design"))];
    let out = orchestrate::retrieve_context(&state, &writer(), input).await.unwrap();

    assert!(out.results.iter().any(|hit| hit.id == design.id));
    assert!(out.results.iter().all(|hit| hit.id != log.id));
}

#[tokio::test]
async fn blank_query_with_filters_is_a_filter_scan() {
    let (state, _dir) = test_state().await;
    let design = orchestrate::store_context(&state, &writer(), store_input("design", "adopt parallel dispatch"))
        .await
        .unwrap();
    orchestrate::store_context(&state, &writer(), store_input("log", "deploy finished"))
        .await
        .unwrap();

    let mut input = retrieve_input("");
    input.filters = vec![ctx_core::FilterExpr::eq("type", serde_json::json!("design"))];
    let out = orchestrate::retrieve_context(&state, &writer(), input).await.unwrap();

    assert_eq!(out.results.len(), 1);
    assert_eq!(out.results[0].id, design.id);
    assert!(out.backends_used.contains(&"graph"));
    assert!(!out.backends_used.contains(&"vector"));
    assert!(!out.backends_used.contains(&"text"));
}

#[tokio::test]
async fn deleting_an_unknown_context_is_not_found() {
    let (state, _dir) = test_state().await;
    let admin = Principal { id: "admin-1".to_string(), role: Role::Admin, is_agent: false };
    let err = orchestrate::delete_context(
        &state,
        &admin,
        orchestrate::DeleteContextInput {
            context_id: ctx_core::ContextId::now_v7(),
            reason: "cleanup".to_string(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind, "not_found");
    assert!(
        state.graph.nodes_with_label(ctx_storage::NodeLabel::Audit).is_empty(),
        "no audit record for a rejected delete"
    );
}

#[tokio::test]
async fn guests_can_see_health_but_not_store_or_retrieve() {
    let (state, _dir) = test_state().await;

    let health = orchestrate::health_detailed(&state, &guest()).await;
    assert!(health.is_ok());

    let store_err = orchestrate::store_context(&state, &guest(), store_input("log", "x"))
        .await
        .unwrap_err();
    assert_eq!(store_err.kind, "auth_forbidden");

    let retrieve_err = orchestrate::retrieve_context(&state, &guest(), retrieve_input("x"))
        .await
        .unwrap_err();
    assert_eq!(retrieve_err.kind, "auth_forbidden");
}

#[tokio::test]
async fn agent_claiming_human_authorship_is_overridden() {
    let (state, _dir) = test_state().await;
    let mut input: StoreContextInput = store_input("log", "attribution check");
    input.author = Some("impostor".to_string());
    input.author_type = Some("human".to_string());

    let stored = orchestrate::store_context(&state, &writer(), input).await.unwrap();

    let node = state
        .graph
        .context_nodes()
        .into_iter()
        .find(|n| n.id == stored.id)
        .expect("context node should exist");
    // The author name is taken as given, the human claim is not.
    assert_eq!(node.metadata.get("author").and_then(|v| v.as_str()), Some("impostor"));
    assert_eq!(node.metadata.get("author_type").and_then(|v| v.as_str()), Some("agent"));
}

#[tokio::test]
async fn sort_by_relevance_orders_by_score() {
    let (state, _dir) = test_state().await;
    for text in ["rate limiter design", "unrelated grocery list"] {
        orchestrate::store_context(&state, &writer(), store_input("design", text)).await.unwrap();
    }

    let mut input = retrieve_input("rate limiter");
    input.search_mode = Some("hybrid".to_string());
    input.sort_by = Some("relevance".to_string());
    let out = orchestrate::retrieve_context(&state, &writer(), input).await.unwrap();
    for pair in out.results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}
