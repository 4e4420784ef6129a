//! In-memory cosine-similarity vector index, keyed by `ContextId`.

use super::{BackendAdapter, SearchHit, SearchQuery, StoreItem};
use async_trait::async_trait;
use ctx_core::{ContextId, CtxResult, EmbeddingVector, HealthCheck, VectorError};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Duration;

struct Entry {
    namespace: String,
    vector: EmbeddingVector,
    metadata: BTreeMap<String, Value>,
}

/// Lazy-created in-memory vector collection. Dimension is fixed on first
/// insert; a later insert with a different dimension is a fatal
/// `VectorError::DimensionMismatch`.
pub struct VectorBackend {
    entries: RwLock<HashMap<ContextId, Entry>>,
    dimensions: RwLock<Option<i32>>,
}

impl VectorBackend {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            dimensions: RwLock::new(None),
        }
    }

    fn check_dimensions(&self, vector: &EmbeddingVector) -> CtxResult<()> {
        let mut guard = self.dimensions.write().unwrap();
        match *guard {
            Some(expected) if expected != vector.dimensions => {
                Err(ctx_core::CtxError::Vector(VectorError::DimensionMismatch {
                    expected,
                    got: vector.dimensions,
                }))
            }
            Some(_) => Ok(()),
            None => {
                *guard = Some(vector.dimensions);
                Ok(())
            }
        }
    }

    /// Metadata the indexed item carried at store time. Stitched Q&A units
    /// record their parent context id here so the dispatcher can collapse
    /// them onto the parent.
    pub fn metadata_of(&self, id: ContextId) -> Option<BTreeMap<String, Value>> {
        self.entries.read().unwrap().get(&id).map(|e| e.metadata.clone())
    }
}

impl Default for VectorBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendAdapter for VectorBackend {
    fn name(&self) -> &'static str {
        "vector"
    }

    async fn store(&self, item: &StoreItem, _deadline: Duration) -> CtxResult<()> {
        let Some(data) = item.embedding.clone() else {
            return Err(ctx_core::CtxError::Vector(VectorError::InvalidVector {
                reason: "no embedding provided for vector store".to_string(),
            }));
        };
        let vector = EmbeddingVector::new(data, "unspecified".to_string());
        self.check_dimensions(&vector)?;
        self.entries.write().unwrap().insert(
            item.id,
            Entry {
                namespace: item.namespace.clone(),
                vector,
                metadata: item.metadata.clone(),
            },
        );
        Ok(())
    }

    async fn search(&self, query: &SearchQuery, _deadline: Duration) -> CtxResult<Vec<SearchHit>> {
        let Some(query_data) = query.embedding.clone() else {
            return Ok(Vec::new());
        };
        let query_vector = EmbeddingVector::new(query_data, "unspecified".to_string());
        let entries = self.entries.read().unwrap();
        let mut scored: Vec<SearchHit> = Vec::new();
        for (id, entry) in entries.iter() {
            if let Some(ns) = &query.namespace {
                if &entry.namespace != ns {
                    continue;
                }
            }
            if !super::passes_filters(&query.filters, &entry.namespace, &entry.metadata) {
                continue;
            }
            match query_vector.cosine_similarity(&entry.vector) {
                Ok(score) => scored.push(SearchHit {
                    id: *id,
                    score,
                    source: "vector",
                }),
                Err(_) => continue,
            }
        }
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(query.limit);
        Ok(scored)
    }

    async fn delete(&self, id: ContextId, _deadline: Duration) -> CtxResult<()> {
        self.entries.write().unwrap().remove(&id);
        Ok(())
    }

    async fn health(&self) -> HealthCheck {
        HealthCheck::healthy("vector").with_metadata(
            "entries",
            serde_json::Value::from(self.entries.read().unwrap().len()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NodeLabel;

    fn item(id: ContextId, ns: &str, v: Vec<f32>) -> StoreItem {
        StoreItem {
            id,
            namespace: ns.to_string(),
            text: String::new(),
            embedding: Some(v),
            metadata: BTreeMap::new(),
            label: NodeLabel::Context,
        }
    }

    #[tokio::test]
    async fn store_then_search_returns_best_match_first() {
        let backend = VectorBackend::new();
        let a = ContextId::now_v7();
        let b = ContextId::now_v7();
        backend
            .store(&item(a, "/global/", vec![1.0, 0.0]), Duration::from_secs(1))
            .await
            .unwrap();
        backend
            .store(&item(b, "/global/", vec![0.0, 1.0]), Duration::from_secs(1))
            .await
            .unwrap();

        let mut query = SearchQuery::new(5);
        query.embedding = Some(vec![1.0, 0.0]);
        let hits = backend.search(&query, Duration::from_secs(1)).await.unwrap();
        assert_eq!(hits[0].id, a);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let backend = VectorBackend::new();
        backend
            .store(
                &item(ContextId::now_v7(), "/global/", vec![1.0, 0.0]),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        let err = backend
            .store(
                &item(ContextId::now_v7(), "/global/", vec![1.0, 0.0, 0.0]),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "internal");
    }

    #[tokio::test]
    async fn delete_is_idempotent_for_missing_and_repeated_ids() {
        let backend = VectorBackend::new();
        let id = ContextId::now_v7();
        backend.delete(id, Duration::from_secs(1)).await.unwrap();
        backend
            .store(&item(id, "/global/", vec![1.0, 0.0]), Duration::from_secs(1))
            .await
            .unwrap();
        backend.delete(id, Duration::from_secs(1)).await.unwrap();
        backend.delete(id, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn metadata_filters_narrow_the_candidate_set() {
        let backend = VectorBackend::new();
        let design = ContextId::now_v7();
        let log = ContextId::now_v7();
        let mut design_item = item(design, "/global/", vec![1.0, 0.0]);
        design_item
            .metadata
            .insert("context_type".to_string(), serde_json::json!("design"));
        let mut log_item = item(log, "/global/", vec![0.9, 0.1]);
        log_item
            .metadata
            .insert("context_type".to_string(), serde_json::json!("log"));
        backend.store(&design_item, Duration::from_secs(1)).await.unwrap();
        backend.store(&log_item, Duration::from_secs(1)).await.unwrap();

        let mut query = SearchQuery::new(10);
        query.embedding = Some(vec![1.0, 0.0]);
        query.filters = vec![ctx_core::FilterExpr::eq("context_type", serde_json::json!("design"))];
        let hits = backend.search(&query, Duration::from_secs(1)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, design);
    }
}
