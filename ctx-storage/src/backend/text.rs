//! In-process BM25 keyword index.
//!
//! The document store is an in-memory, readers-writer-lock-guarded
//! collection; the ranking function is Okapi BM25 (k1=1.2, b=0.75).
//! Rebuilt from the graph backend on startup when persistence is off,
//! since this index carries no state the graph backend doesn't already
//! have.

use super::{BackendAdapter, SearchHit, SearchQuery, StoreItem};
use async_trait::async_trait;
use ctx_core::{ContextId, CtxResult, HealthCheck};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Duration;

const K1: f32 = 1.2;
const B: f32 = 0.75;

struct Document {
    namespace: String,
    term_freqs: HashMap<String, u32>,
    length: usize,
    metadata: BTreeMap<String, serde_json::Value>,
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// In-memory Okapi BM25 index over context text, scoped by namespace.
pub struct TextBackend {
    docs: RwLock<HashMap<ContextId, Document>>,
}

impl TextBackend {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }

    fn doc_freq(docs: &HashMap<ContextId, Document>, term: &str) -> usize {
        docs.values().filter(|d| d.term_freqs.contains_key(term)).count()
    }

    fn avg_doc_length(docs: &HashMap<ContextId, Document>) -> f32 {
        if docs.is_empty() {
            return 0.0;
        }
        docs.values().map(|d| d.length as f32).sum::<f32>() / docs.len() as f32
    }

    fn score(docs: &HashMap<ContextId, Document>, doc: &Document, query_terms: &[String]) -> f32 {
        let n = docs.len() as f32;
        let avgdl = Self::avg_doc_length(docs);
        let mut score = 0.0;
        for term in query_terms {
            let Some(&tf) = doc.term_freqs.get(term) else {
                continue;
            };
            let df = Self::doc_freq(docs, term) as f32;
            if df == 0.0 {
                continue;
            }
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            let tf = tf as f32;
            let denom = tf + K1 * (1.0 - B + B * (doc.length as f32 / avgdl.max(1.0)));
            score += idf * (tf * (K1 + 1.0)) / denom.max(f32::EPSILON);
        }
        score
    }
}

impl Default for TextBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendAdapter for TextBackend {
    fn name(&self) -> &'static str {
        "text"
    }

    async fn store(&self, item: &StoreItem, _deadline: Duration) -> CtxResult<()> {
        let tokens = tokenize(&item.text);
        let mut term_freqs = HashMap::new();
        for token in &tokens {
            *term_freqs.entry(token.clone()).or_insert(0u32) += 1;
        }
        self.docs.write().unwrap().insert(
            item.id,
            Document {
                namespace: item.namespace.clone(),
                length: tokens.len(),
                term_freqs,
                metadata: item.metadata.clone(),
            },
        );
        Ok(())
    }

    async fn search(&self, query: &SearchQuery, _deadline: Duration) -> CtxResult<Vec<SearchHit>> {
        let Some(text) = query.text.as_ref() else {
            return Ok(Vec::new());
        };
        let query_terms = tokenize(text);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self.docs.read().unwrap();
        let mut hits: Vec<SearchHit> = docs
            .iter()
            .filter(|(_, doc)| {
                query
                    .namespace
                    .as_ref()
                    .map(|ns| &doc.namespace == ns)
                    .unwrap_or(true)
            })
            .filter(|(_, doc)| super::passes_filters(&query.filters, &doc.namespace, &doc.metadata))
            .map(|(id, doc)| SearchHit {
                id: *id,
                score: Self::score(&docs, doc, &query_terms),
                source: "text",
            })
            .filter(|hit| hit.score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn delete(&self, id: ContextId, _deadline: Duration) -> CtxResult<()> {
        self.docs.write().unwrap().remove(&id);
        Ok(())
    }

    async fn health(&self) -> HealthCheck {
        HealthCheck::healthy("text")
            .with_metadata("documents", serde_json::Value::from(self.docs.read().unwrap().len()))
    }
}
