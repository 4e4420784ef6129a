//! Query dispatch and ranking/query rewriting.
//!
//! Fan out to several sources, score each candidate with a four-component
//! weighted score under per-backend deadlines, and explain what was kept.
//! See [`dispatch`] for the fan-out and [`rank`] for the scoring.

pub mod dispatch;
pub mod rank;

pub use dispatch::{
    dispatch, select_backends, Backends, DeletionOracle, DispatchOutcome, DispatchRequest,
    MergedHit, NoQaCollapse, NothingDeleted, QaParentLookup,
};
pub use rank::{
    age_days, classify_intent, fact_prior, graph_hop_score, rewrite_query, score, Entity,
    Explanation, Intent, ScoreAdjustments, ScoreComponents,
};

use chrono::{DateTime, Utc};
use ctx_core::{ContextId, ContextType, CtxResult, EntityIdType, RankingPolicyConfig};
use std::collections::BTreeMap;

/// One candidate in a ranked response, with its full scoring explanation.
#[derive(Debug, Clone)]
pub struct RankedHit {
    pub id: ContextId,
    pub sources: Vec<&'static str>,
    pub explanation: Explanation,
}

/// Everything about this one query, from intent classification through
/// ranked, explained results, the single call the tool surface makes for
/// `retrieve_context`/`query_graph`'s `relevance` sort.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub intent: Intent,
    pub intent_confidence: f32,
    pub rewrites: Vec<String>,
    pub hits: Vec<RankedHit>,
    pub dispatch: DispatchReport,
}

/// The parts of [`DispatchOutcome`] worth reporting back to the caller,
/// independent of which rewrite variant produced them.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub source_breakdown: BTreeMap<&'static str, usize>,
    pub backend_outcomes: BTreeMap<&'static str, ctx_core::BackendOutcome>,
    pub latencies_ms: BTreeMap<&'static str, u64>,
}

/// Per-candidate facts the ranker needs but the dispatcher doesn't carry:
/// graph hop distance, raw text, type, and age. A thin lookup rather than a
/// concrete backend dependency, same decoupling as [`DeletionOracle`].
pub trait CandidateFacts: Send + Sync {
    fn text(&self, id: ContextId) -> Option<String>;
    fn context_type(&self, id: ContextId) -> Option<ContextType>;
    fn created_at(&self, id: ContextId) -> Option<DateTime<Utc>>;
}

/// Dispatch `request` (optionally across its query rewrites too, taking the
/// max dense score per candidate), then rank and explain every surviving
/// hit. This is the one call the rest of the system should make; [`dispatch`]
/// and the `rank` module remain public for callers who need just one stage.
#[allow(clippy::too_many_arguments)]
pub async fn execute_query(
    request: &DispatchRequest,
    backends: &Backends,
    timeouts: &BTreeMap<String, i64>,
    deletion: &dyn DeletionOracle,
    qa_parent: &dyn QaParentLookup,
    facts: &dyn CandidateFacts,
    policy: &RankingPolicyConfig,
    now: DateTime<Utc>,
) -> CtxResult<QueryResponse> {
    let query_text = request.query_text.clone().unwrap_or_default();
    let (intent, confidence, _entities) = classify_intent(&query_text);
    let rewrites = rewrite_query(&query_text, intent, confidence, policy.max_rewrites);

    // Dispatch once per rewrite variant (the original is always element
    // zero), keeping the max dense score per candidate id across variants.
    let mut dense_by_id: BTreeMap<ContextId, f32> = BTreeMap::new();
    let mut last_outcome: Option<DispatchOutcome> = None;
    for variant in &rewrites {
        let mut variant_request = request.clone();
        variant_request.query_text =
            (!variant.trim().is_empty()).then(|| variant.clone());
        let outcome = dispatch(&variant_request, backends, timeouts, deletion, qa_parent).await?;
        for hit in &outcome.hits {
            dense_by_id
                .entry(hit.id)
                .and_modify(|s| *s = s.max(hit.score))
                .or_insert(hit.score);
        }
        last_outcome = Some(outcome);
    }
    let outcome = last_outcome.expect("rewrites always contains at least the original query");

    let exact_match_needle = query_text.to_lowercase();
    let mut ranked: Vec<RankedHit> = outcome
        .hits
        .iter()
        .map(|hit| {
            let text = facts.text(hit.id).unwrap_or_default();
            let context_type = facts.context_type(hit.id);
            let created_at = facts.created_at(hit.id).unwrap_or(now);
            let dense = dense_by_id.get(&hit.id).copied().unwrap_or(hit.score);
            let lexical = if hit.sources.contains(&"text") { hit.score } else { 0.0 };
            let components = ScoreComponents {
                dense,
                lexical,
                graph: if hit.sources.contains(&"graph") { graph_hop_score(Some(0)) } else { 0.0 },
                fact_prior: fact_prior(&text, context_type, policy, intent),
            };
            let adjustments = ScoreAdjustments {
                exact_match: !exact_match_needle.is_empty() && text.to_lowercase().contains(&exact_match_needle),
                age_days: age_days(created_at, now),
                context_type,
            };
            let explanation = score(components, adjustments, policy, intent);
            RankedHit { id: hit.id, sources: hit.sources.clone(), explanation }
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.explanation
            .final_score
            .partial_cmp(&a.explanation.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(QueryResponse {
        intent,
        intent_confidence: confidence,
        rewrites,
        hits: ranked,
        dispatch: DispatchReport {
            source_breakdown: outcome.source_breakdown,
            backend_outcomes: outcome.backend_outcomes,
            latencies_ms: outcome.latencies_ms,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctx_storage::{BackendAdapter, GraphBackend, TextBackend, VectorBackend};
    use std::sync::Arc;
    use std::time::Duration;

    struct NoFacts;
    impl CandidateFacts for NoFacts {
        fn text(&self, _id: ContextId) -> Option<String> {
            None
        }
        fn context_type(&self, _id: ContextId) -> Option<ContextType> {
            None
        }
        fn created_at(&self, _id: ContextId) -> Option<DateTime<Utc>> {
            None
        }
    }

    #[tokio::test]
    async fn execute_query_ranks_and_reports_dispatch_attribution() {
        let dir = tempfile::tempdir().unwrap();
        let backends = Backends {
            vector: Arc::new(VectorBackend::new()),
            graph: Arc::new(GraphBackend::new()),
            text: Arc::new(TextBackend::new()),
            kv: Arc::new(ctx_storage::KvBackend::open(dir.path()).unwrap()),
        };
        let id = ContextId::now_v7();
        let item = ctx_storage::StoreItem::context(id, "/global/", "how do I configure the rate limiter");
        backends.text.store(&item, Duration::from_secs(1)).await.unwrap();
        backends.graph.store(&item, Duration::from_secs(1)).await.unwrap();

        let request = DispatchRequest {
            query_text: Some("how do I configure the rate limiter".to_string()),
            query_vector: None,
            search_mode: ctx_core::SearchMode::Hybrid,
            dispatch_policy: ctx_core::DispatchPolicy::Parallel,
            namespace: None,
            filters: Vec::new(),
            limit: 10,
        };
        let policy = RankingPolicyConfig::default();
        let response = execute_query(
            &request,
            &backends,
            &BTreeMap::new(),
            &NothingDeleted,
            &NoQaCollapse,
            &NoFacts,
            &policy,
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(response.intent, Intent::Configuration);
        assert!(response.hits.iter().any(|h| h.id == id));
        assert!(!response.dispatch.source_breakdown.is_empty());
    }
}
