//! Shared setup for the integration tests: a fully wired [`AppState`] over
//! in-process backends, with the KV store on a per-test temp dir.

use ctx_api::{build_state, AppState};
use ctx_core::CtxConfig;
use tempfile::TempDir;

/// Build an [`AppState`] from the standard test config. The returned
/// `TempDir` owns the KV store's directory; keep it alive for the duration
/// of the test.
pub async fn test_state() -> (AppState, TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir for kv backend");
    let mut config = CtxConfig::default_for_tests();
    config.storage.kv.endpoint = format!("file://{}", dir.path().display());
    let state = build_state(config).await.expect("failed to bootstrap test state");
    (state, dir)
}

/// `store_context` input with `text` content and no explicit author.
pub fn store_input(
    context_type: &str,
    text: &str,
) -> ctx_api::orchestrate::StoreContextInput {
    store_input_with(context_type, text, &[])
}

/// `store_context` input carrying extra content keys alongside `text`.
pub fn store_input_with(
    context_type: &str,
    text: &str,
    extra: &[(&str, &str)],
) -> ctx_api::orchestrate::StoreContextInput {
    let mut content = std::collections::BTreeMap::new();
    content.insert(
        "text".to_string(),
        serde_json::Value::String(text.to_string()),
    );
    for (key, value) in extra {
        content.insert(key.to_string(), serde_json::Value::String(value.to_string()));
    }
    ctx_api::orchestrate::StoreContextInput {
        context_type: context_type.to_string(),
        content,
        metadata: std::collections::BTreeMap::new(),
        author: None,
        author_type: None,
    }
}

/// `retrieve_context` input with everything defaulted except the query.
pub fn retrieve_input(query: &str) -> ctx_api::orchestrate::RetrieveContextInput {
    ctx_api::orchestrate::RetrieveContextInput {
        query: query.to_string(),
        search_mode: None,
        limit: None,
        filters: Vec::new(),
        namespace: None,
        sort_by: None,
        ranking_policy: None,
    }
}
