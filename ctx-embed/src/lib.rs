//! Embedding service: produces fixed-dimension dense vectors behind a
//! provider trait, self-tests on init, and degrades loudly rather than
//! silently dropping a vector.
//!
//! The service always runs exactly one configured provider behind the
//! [`EmbeddingProvider`] trait; `openai`/`ollama` live under `providers/`.
//! [`EmbeddingPipelineStatus`] is the single process-wide health signal the
//! startup self-test writes.

pub mod providers;

use async_trait::async_trait;
use ctx_core::{CtxError, CtxResult, EmbedError, EmbeddingVector};
use sha2::{Digest, Sha256};
use std::sync::{Arc, RwLock};

pub use providers::{OllamaEmbeddingProvider, OpenAIEmbeddingProvider};

/// Async trait for embedding providers. Implementations must be thread-safe.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> CtxResult<EmbeddingVector>;
    async fn embed_batch(&self, texts: &[&str]) -> CtxResult<Vec<EmbeddingVector>>;
    fn dimensions(&self) -> i32;
    fn model_id(&self) -> &str;
}

const SELF_TEST_PROBE: &str = "ctx-embed self-test probe";

/// Configuration for the embedding service, loaded from
/// `CtxConfig::embedding`.
#[derive(Debug, Clone)]
pub struct EmbedConfig {
    pub model: String,
    pub dimensions: i32,
    pub provider: ProviderKind,
}

/// Which concrete provider backs the service. `Hash` is the deterministic,
/// dependency-free default; the provider trait is the seam a real model
/// plugs into.
#[derive(Debug, Clone)]
pub enum ProviderKind {
    Hash,
    OpenAi { api_key: String },
    Ollama { base_url: String },
}

/// Deterministic hash-embedding provider: no network calls, no external
/// model. Maps text to a fixed-dimension unit vector via SHA-256 over
/// sliding byte windows, so identical input always produces an identical
/// vector and the service can run with zero configuration.
pub struct HashEmbeddingProvider {
    dimensions: i32,
}

impl HashEmbeddingProvider {
    pub fn new(dimensions: i32) -> Self {
        Self { dimensions }
    }

    fn hash_embed(&self, text: &str) -> Vec<f32> {
        let dims = self.dimensions.max(1) as usize;
        let mut data = vec![0.0f32; dims];
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        for (i, byte) in digest.iter().cycle().take(dims.max(digest.len())).enumerate() {
            data[i % dims] += (*byte as f32 - 127.5) / 127.5;
        }
        let norm: f32 = data.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut data {
                *x /= norm;
            }
        }
        data
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> CtxResult<EmbeddingVector> {
        Ok(EmbeddingVector::new(self.hash_embed(text), "hash-embed-v1".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> CtxResult<Vec<EmbeddingVector>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> i32 {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        "hash-embed-v1"
    }
}

/// Process-wide embedding pipeline health, written once at startup by the
/// self-test and read by the `health_detailed` tool. A plain
/// `Arc<RwLock<_>>` rather than `arc-swap`, since writes happen only at
/// startup (and on provider reconfiguration), not on the hot path.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EmbeddingPipelineStatus {
    pub backend_connected: bool,
    pub service_loaded: bool,
    pub collection_ok: bool,
    pub self_test_ok: bool,
    pub error: Option<String>,
}

/// Wraps a single configured [`EmbeddingProvider`] with dimension
/// validation and a startup self-test. `embed` never panics or silently
/// drops a vector: callers get `Ok` or a structured [`CtxError::Embed`].
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    config: EmbedConfig,
    status: Arc<RwLock<EmbeddingPipelineStatus>>,
}

impl EmbeddingService {
    /// Construct the service around a provider and run the startup
    /// self-test immediately, recording the outcome into
    /// [`EmbeddingPipelineStatus`].
    pub async fn new(provider: Arc<dyn EmbeddingProvider>, config: EmbedConfig) -> Self {
        let service = Self {
            provider,
            config,
            status: Arc::new(RwLock::new(EmbeddingPipelineStatus::default())),
        };
        service.self_test().await;
        service
    }

    /// Build a service from config alone, selecting the concrete provider
    /// named by `config.provider`.
    pub async fn from_config(config: EmbedConfig) -> Self {
        let provider: Arc<dyn EmbeddingProvider> = match &config.provider {
            ProviderKind::Hash => Arc::new(HashEmbeddingProvider::new(config.dimensions)),
            ProviderKind::OpenAi { api_key } => Arc::new(OpenAIEmbeddingProvider::new(
                api_key.clone(),
                config.model.clone(),
                config.dimensions,
            )),
            ProviderKind::Ollama { base_url } => Arc::new(OllamaEmbeddingProvider::new(
                base_url.clone(),
                config.model.clone(),
                config.dimensions,
            )),
        };
        Self::new(provider, config).await
    }

    async fn self_test(&self) {
        let mut status = EmbeddingPipelineStatus {
            service_loaded: true,
            ..Default::default()
        };
        match self.provider.embed(SELF_TEST_PROBE).await {
            Ok(vector) if vector.dimensions == self.config.dimensions => {
                status.backend_connected = true;
                status.collection_ok = true;
                status.self_test_ok = true;
            }
            Ok(vector) => {
                status.backend_connected = true;
                status.error = Some(format!(
                    "self-test dimension mismatch: configured {} got {}",
                    self.config.dimensions, vector.dimensions
                ));
            }
            Err(e) => {
                status.error = Some(e.to_string());
            }
        }
        *self.status.write().unwrap() = status;
    }

    /// Process-wide pipeline status snapshot, surfaced verbatim by the
    /// health endpoint.
    pub fn status(&self) -> EmbeddingPipelineStatus {
        self.status.read().unwrap().clone()
    }

    /// Produce a dense vector of the configured dimension. Never silently
    /// drops the request: a provider failure is returned as a structured
    /// `CtxError::Embed` for the caller (the store orchestrator) to
    /// translate into `embedding_status = failed`.
    pub async fn embed(&self, text: &str) -> CtxResult<EmbeddingVector> {
        let vector = self.provider.embed(text).await?;
        if vector.dimensions != self.config.dimensions {
            return Err(CtxError::Embed(EmbedError::EmbeddingFailed {
                reason: format!(
                    "provider returned {} dimensions, configured dimension is {}",
                    vector.dimensions, self.config.dimensions
                ),
            }));
        }
        Ok(vector)
    }

    pub fn dimensions(&self) -> i32 {
        self.config.dimensions
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }
}
