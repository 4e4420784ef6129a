//! Turns a loaded [`CtxConfig`] into a running [`AppState`]: opens the three
//! storage backends, runs the embedding self-test, and seeds the API key
//! store. Split out of `main.rs` so tests can build the same state without
//! going through process startup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use ctx_auth::{ApiKeyStore, GraphAuditLog};
use ctx_core::{BackendEndpoint, CtxConfig, CtxResult};
use ctx_embed::{EmbedConfig, EmbeddingService, ProviderKind};
use ctx_query::Backends;
use ctx_storage::{BackendAdapter, GraphBackend, KvBackend, TextBackend, VectorBackend};
use ctx_sync::EventLog;

use crate::state::AppState;

/// `memory://...` endpoints (the defaults `CtxConfig::default_for_tests`
/// seeds) fall back to a process-local temp directory for the KV backend,
/// which is the only backend that needs a filesystem path.
fn kv_path(endpoint: &BackendEndpoint) -> PathBuf {
    if let Some(path) = endpoint.endpoint.strip_prefix("file://") {
        PathBuf::from(path)
    } else {
        std::env::temp_dir().join("ctx-api-kv")
    }
}

pub async fn build_state(config: CtxConfig) -> CtxResult<AppState> {
    config.validate()?;

    let vector = Arc::new(VectorBackend::new());
    let graph = Arc::new(GraphBackend::new());
    let text: Arc<dyn BackendAdapter> = Arc::new(TextBackend::new());
    let kv = Arc::new(KvBackend::open(&kv_path(&config.storage.kv))?);

    let backends = Arc::new(Backends {
        vector: vector.clone() as Arc<dyn BackendAdapter>,
        graph: graph.clone(),
        text,
        kv: kv.clone() as Arc<dyn BackendAdapter>,
    });

    let embed_config = EmbedConfig {
        model: config.embedding.model.clone(),
        dimensions: config.embedding.dimensions,
        provider: ProviderKind::Hash,
    };
    let embedding = Arc::new(EmbeddingService::from_config(embed_config).await);
    if config.strict_embeddings && !embedding.status().self_test_ok {
        return Err(ctx_core::CtxError::Embed(ctx_core::EmbedError::SelfTestFailed {
            reason: embedding.status().error.unwrap_or_else(|| "unknown".to_string()),
        }));
    }

    let api_keys = Arc::new(ApiKeyStore::from_config(&config.auth));
    let audit_log = Arc::new(GraphAuditLog::new(graph.clone() as Arc<dyn BackendAdapter>));
    let event_log = Arc::new(EventLog::new());

    Ok(AppState {
        config: Arc::new(config),
        backends,
        kv,
        graph,
        vector,
        embedding,
        api_keys,
        audit_log,
        event_log,
        start_time: Instant::now(),
    })
}
