//! Storage layer: backend adapters plus the namespace/lock manager.
//!
//! `backend` holds the uniform [`backend::BackendAdapter`] trait and its
//! four implementations (vector, graph, kv, text). The TTL/event-log/sync
//! worker that reconciles the KV backend with the graph lives in
//! `ctx-sync`, which depends on this crate for the backend adapters it
//! reconciles.

pub mod backend;
pub mod lock;
pub mod namespace;

pub use backend::{
    scratch_key, BackendAdapter, GraphBackend, GraphContextNode, GraphQuery, KvBackend, NodeLabel,
    SearchHit, SearchQuery, StoreItem, TextBackend, VectorBackend,
};
pub use lock::{LockLease, LockManager};
pub use namespace::{Namespace, NamespaceHint, NamespaceScope};
