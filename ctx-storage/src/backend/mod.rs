//! Backend adapters: a uniform `store`/`search`/`delete`/`health`
//! surface over heterogeneous storage engines.
//!
//! One async trait covers all four backend families. The dispatcher
//! (`ctx-query`) and the store orchestrator (`ctx-api`) depend only on
//! this trait, never on a concrete backend.

mod graph;
pub(crate) mod kv;
mod text;
mod vector;

pub use graph::{GraphBackend, GraphContextNode, GraphQuery, NodeLabel};
pub use kv::{scratch_key, KvBackend};
pub use text::TextBackend;
pub use vector::VectorBackend;

use async_trait::async_trait;
use ctx_core::{ContextId, CtxResult, HealthCheck};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// A single item handed to a backend's `store` method. Backends are free to
/// ignore fields they don't index (e.g. `TextBackend` ignores `embedding`).
/// `label` records which of the graph's four node kinds this item is
/// (events and scratchpads are periodically persisted into the graph
/// alongside contexts); non-graph backends ignore it.
#[derive(Debug, Clone)]
pub struct StoreItem {
    pub id: ContextId,
    pub namespace: String,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: BTreeMap<String, Value>,
    pub label: NodeLabel,
}

impl StoreItem {
    /// Construct a `Context`-labeled item, the common case on the store
    /// orchestrator's write path.
    pub fn context(id: ContextId, namespace: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            namespace: namespace.into(),
            text: text.into(),
            embedding: None,
            metadata: BTreeMap::new(),
            label: NodeLabel::Context,
        }
    }
}

/// Whether a candidate satisfies every filter condition on the query.
/// `namespace` is matched against the item's own namespace; every other
/// field is looked up in the item's metadata.
pub(crate) fn passes_filters(
    filters: &[ctx_core::FilterExpr],
    namespace: &str,
    metadata: &BTreeMap<String, Value>,
) -> bool {
    filters.iter().all(|filter| {
        if filter.field == "namespace" {
            filter.matches(Some(&Value::String(namespace.to_string())))
        } else {
            filter.matches(metadata.get(&filter.field))
        }
    })
}

/// A backend-agnostic search request.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub namespace: Option<String>,
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub limit: usize,
    pub filters: Vec<ctx_core::FilterExpr>,
}

impl SearchQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            namespace: None,
            text: None,
            embedding: None,
            limit,
            filters: Vec::new(),
        }
    }
}

/// One match returned by a backend, with enough provenance for the
/// dispatcher to attribute the result to its source backend.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: ContextId,
    pub score: f32,
    pub source: &'static str,
}

/// Uniform async surface every backend family implements.
///
/// `store`/`search`/`delete` all carry an explicit `deadline`; on expiry the
/// adapter returns `StorageError::DeadlineExceeded` rather than blocking
/// indefinitely.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn store(&self, item: &StoreItem, deadline: Duration) -> CtxResult<()>;

    async fn search(&self, query: &SearchQuery, deadline: Duration) -> CtxResult<Vec<SearchHit>>;

    async fn delete(&self, id: ContextId, deadline: Duration) -> CtxResult<()>;

    async fn health(&self) -> HealthCheck;
}
