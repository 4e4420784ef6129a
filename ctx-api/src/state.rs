//! Shared application state for Axum routers.
//!
//! One `Clone` struct of `Arc`-wrapped shared services, extracted into
//! handlers via `axum::extract::State` rather than threaded through every
//! function signature.

use std::sync::Arc;
use std::time::Instant;

use ctx_auth::{ApiKeyStore, AuditLog};
use ctx_core::CtxConfig;
use ctx_embed::EmbeddingService;
use ctx_query::Backends;
use ctx_storage::{GraphBackend, KvBackend, VectorBackend};
use ctx_sync::EventLog;

/// Application-wide state shared across all tool handlers.
///
/// `kv`/`graph`/`vector` are kept as concrete `Arc`s (not just inside
/// `backends`) because [`ctx_sync::LockCoordinator`] and the lookup
/// adapters need the concrete type, not the type-erased `BackendAdapter`
/// the dispatcher uses.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CtxConfig>,
    pub backends: Arc<Backends>,
    pub kv: Arc<KvBackend>,
    pub graph: Arc<GraphBackend>,
    pub vector: Arc<VectorBackend>,
    pub embedding: Arc<EmbeddingService>,
    pub api_keys: Arc<ApiKeyStore>,
    pub audit_log: Arc<dyn AuditLog>,
    pub event_log: Arc<EventLog>,
    pub start_time: Instant,
}

crate::impl_from_ref!(Arc<CtxConfig>, config);
crate::impl_from_ref!(Arc<Backends>, backends);
crate::impl_from_ref!(Arc<KvBackend>, kv);
crate::impl_from_ref!(Arc<GraphBackend>, graph);
crate::impl_from_ref!(Arc<VectorBackend>, vector);
crate::impl_from_ref!(Arc<EmbeddingService>, embedding);
crate::impl_from_ref!(Arc<ApiKeyStore>, api_keys);
crate::impl_from_ref!(Arc<dyn AuditLog>, audit_log);
crate::impl_from_ref!(Arc<EventLog>, event_log);
crate::impl_from_ref!(Instant, start_time);
