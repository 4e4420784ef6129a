//! Query dispatcher: backend selection, fan-out under a dispatch
//! policy, merge-by-id, and source attribution.
//!
//! Fans out to several typed sources, merges the results under per-backend
//! deadlines, and records what happened in [`DispatchOutcome`]'s
//! backend-outcome/latency maps.

use ctx_core::{
    BackendOutcome, ContextId, CtxError, CtxResult, DispatchError, DispatchPolicy, EntityIdType,
    FilterExpr, SearchMode,
};
use ctx_storage::{BackendAdapter, GraphBackend, SearchHit, SearchQuery};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Fixed priority order for `sequential`/`fallback` dispatch and for
/// `auto` mode's backend selection.
const PRIORITY: [&str; 4] = ["vector", "graph", "text", "kv"];

/// Confidence a `smart` dispatch accepts from early backends before
/// cancelling the ones still in flight.
const SMART_CONFIDENCE_THRESHOLD: f32 = 0.85;

const DEFAULT_DEADLINE_MS: i64 = 100;

/// The four backend families a query may be dispatched to, held as trait
/// objects except `graph`, which callers also need concretely (hop-distance
/// scoring lives outside this module, in the ranker's score assembly).
pub struct Backends {
    pub vector: Arc<dyn BackendAdapter>,
    pub graph: Arc<GraphBackend>,
    pub text: Arc<dyn BackendAdapter>,
    pub kv: Arc<dyn BackendAdapter>,
}

impl Backends {
    fn adapter(&self, name: &str) -> Option<Arc<dyn BackendAdapter>> {
        match name {
            "vector" => Some(self.vector.clone()),
            "graph" => Some(self.graph.clone() as Arc<dyn BackendAdapter>),
            "text" => Some(self.text.clone()),
            "kv" => Some(self.kv.clone()),
            _ => None,
        }
    }
}

/// Caller-supplied knowledge the dispatcher cannot derive from a single
/// backend's search results alone. Injected rather than hard-coded against
/// `GraphBackend` so the dispatcher stays backend-shape agnostic, the same
/// decoupling `ctx-expand::relate::ContextLookup` uses for detection.
pub trait DeletionOracle: Send + Sync {
    /// Whether `id` is soft-deleted or purged and must never surface in a
    /// merged result set, regardless of which backend found it.
    fn is_deleted(&self, id: ContextId) -> bool;
}

/// Resolves a Q&A stitched unit's id to its parent context id, so duplicate
/// units collapse onto the parent before ranking.
pub trait QaParentLookup: Send + Sync {
    fn parent_of(&self, id: ContextId) -> Option<ContextId>;
}

/// A dispatcher that never collapses anything, for callers with no Q&A
/// index wired up yet (e.g. unit tests exercising only context search).
pub struct NoQaCollapse;
impl QaParentLookup for NoQaCollapse {
    fn parent_of(&self, _id: ContextId) -> Option<ContextId> {
        None
    }
}

/// A dispatcher that treats nothing as deleted.
pub struct NothingDeleted;
impl DeletionOracle for NothingDeleted {
    fn is_deleted(&self, _id: ContextId) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub query_text: Option<String>,
    pub query_vector: Option<Vec<f32>>,
    pub search_mode: SearchMode,
    pub dispatch_policy: DispatchPolicy,
    pub namespace: Option<String>,
    pub filters: Vec<FilterExpr>,
    pub limit: usize,
}

impl DispatchRequest {
    fn search_query(&self) -> SearchQuery {
        let mut q = SearchQuery::new(self.limit);
        q.namespace = self.namespace.clone();
        q.text = self.query_text.clone();
        q.embedding = self.query_vector.clone();
        q.filters = self.filters.clone();
        q
    }
}

/// One surviving candidate after merge, dedup, and soft-delete filtering.
#[derive(Debug, Clone)]
pub struct MergedHit {
    pub id: ContextId,
    /// Max score across every backend that returned this id.
    pub score: f32,
    /// The backend that contributed the max score. `source_breakdown`
    /// counts each hit exactly once, under this backend, so the breakdown
    /// always sums to the final result count.
    pub best_source: &'static str,
    pub sources: Vec<&'static str>,
}

/// Everything the dispatcher learned about this one query, enough for the
/// caller to build a response envelope without re-deriving it.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub hits: Vec<MergedHit>,
    /// Per-backend count of hits it contributed to the final merged set.
    /// Sums to the final hit count by construction.
    pub source_breakdown: BTreeMap<&'static str, usize>,
    pub backend_outcomes: BTreeMap<&'static str, BackendOutcome>,
    pub latencies_ms: BTreeMap<&'static str, u64>,
}

/// Pick which backend families participate, from `search_mode` and, for
/// `Auto`, from the query's own shape.
pub fn select_backends(mode: SearchMode, req: &DispatchRequest) -> Vec<&'static str> {
    match mode {
        SearchMode::Vector => vec!["vector"],
        SearchMode::Graph => vec!["graph"],
        SearchMode::Text => vec!["text"],
        SearchMode::Kv => vec!["kv"],
        SearchMode::Hybrid => PRIORITY.to_vec(),
        SearchMode::Auto => {
            let mut selected = Vec::new();
            if req.query_vector.is_some() {
                selected.push("vector");
            }
            if req.query_text.as_deref().is_some_and(|t| !t.trim().is_empty()) {
                selected.push("text");
            }
            // Empty query with filters: scan structured backends only
            // (vector/text have nothing to score on).
            if selected.is_empty() || !req.filters.is_empty() {
                selected.push("graph");
                let blank = req.query_text.as_deref().map_or(true, |t| t.trim().is_empty());
                if blank && req.query_vector.is_none() {
                    selected.push("kv");
                }
            }
            selected
        }
    }
}

fn deadline_for(name: &str, timeouts: &BTreeMap<String, i64>) -> Duration {
    let ms = timeouts.get(name).copied().unwrap_or(DEFAULT_DEADLINE_MS).max(1);
    Duration::from_millis(ms as u64)
}

struct BackendRun {
    name: &'static str,
    outcome: BackendOutcome,
    hits: Vec<SearchHit>,
    elapsed: Duration,
}

async fn run_one(name: &'static str, adapter: Arc<dyn BackendAdapter>, query: SearchQuery, deadline: Duration) -> BackendRun {
    let started = Instant::now();
    match tokio::time::timeout(deadline, adapter.search(&query, deadline)).await {
        Ok(Ok(hits)) => BackendRun { name, outcome: BackendOutcome::Ok, hits, elapsed: started.elapsed() },
        Ok(Err(_)) => BackendRun { name, outcome: BackendOutcome::Unavailable, hits: Vec::new(), elapsed: started.elapsed() },
        Err(_) => BackendRun { name, outcome: BackendOutcome::TimedOut, hits: Vec::new(), elapsed: started.elapsed() },
    }
}

async fn dispatch_parallel(selected: &[&'static str], backends: &Backends, query: &SearchQuery, timeouts: &BTreeMap<String, i64>) -> Vec<BackendRun> {
    let mut set = JoinSet::new();
    for &name in selected {
        let Some(adapter) = backends.adapter(name) else { continue };
        let deadline = deadline_for(name, timeouts);
        let query = query.clone();
        set.spawn(run_one(name, adapter, query, deadline));
    }
    let mut runs = Vec::new();
    while let Some(joined) = set.join_next().await {
        if let Ok(run) = joined {
            runs.push(run);
        }
    }
    runs
}

async fn dispatch_smart(selected: &[&'static str], backends: &Backends, query: &SearchQuery, timeouts: &BTreeMap<String, i64>) -> Vec<BackendRun> {
    let mut set = JoinSet::new();
    for &name in selected {
        let Some(adapter) = backends.adapter(name) else { continue };
        let deadline = deadline_for(name, timeouts);
        let query = query.clone();
        set.spawn(run_one(name, adapter, query, deadline));
    }
    let mut runs = Vec::new();
    while let Some(joined) = set.join_next().await {
        let Ok(run) = joined else { continue };
        let best = run.hits.iter().map(|h| h.score).fold(0.0_f32, f32::max);
        runs.push(run);
        if best >= SMART_CONFIDENCE_THRESHOLD {
            set.abort_all();
            break;
        }
    }
    runs
}

async fn dispatch_sequential(selected: &[&'static str], backends: &Backends, query: &SearchQuery, timeouts: &BTreeMap<String, i64>, limit: usize) -> Vec<BackendRun> {
    let mut runs = Vec::new();
    let mut accumulated = 0usize;
    for name in PRIORITY.iter().copied().filter(|n| selected.contains(n)) {
        let Some(adapter) = backends.adapter(name) else { continue };
        let deadline = deadline_for(name, timeouts);
        let run = run_one(name, adapter, query.clone(), deadline).await;
        accumulated += run.hits.len();
        runs.push(run);
        if accumulated >= limit {
            break;
        }
    }
    runs
}

async fn dispatch_fallback(selected: &[&'static str], backends: &Backends, query: &SearchQuery, timeouts: &BTreeMap<String, i64>) -> Vec<BackendRun> {
    let mut runs = Vec::new();
    for name in PRIORITY.iter().copied().filter(|n| selected.contains(n)) {
        let Some(adapter) = backends.adapter(name) else { continue };
        let deadline = deadline_for(name, timeouts);
        let run = run_one(name, adapter, query.clone(), deadline).await;
        let succeeded = matches!(run.outcome, BackendOutcome::Ok) && !run.hits.is_empty();
        runs.push(run);
        if succeeded {
            break;
        }
    }
    runs
}

/// Run the dispatch, merge results by id (max score wins, all contributing
/// sources recorded), filter soft-deleted ids, and collapse any Q&A unit
/// onto its parent context.
pub async fn dispatch(
    req: &DispatchRequest,
    backends: &Backends,
    timeouts: &BTreeMap<String, i64>,
    deletion: &dyn DeletionOracle,
    qa_parent: &dyn QaParentLookup,
) -> CtxResult<DispatchOutcome> {
    let selected = select_backends(req.search_mode, req);
    if selected.is_empty() {
        return Err(CtxError::Dispatch(DispatchError::UnsupportedMode { mode: format!("{:?}", req.search_mode) }));
    }
    let query = req.search_query();

    let runs = match req.dispatch_policy {
        DispatchPolicy::Parallel => dispatch_parallel(&selected, backends, &query, timeouts).await,
        DispatchPolicy::Smart => dispatch_smart(&selected, backends, &query, timeouts).await,
        DispatchPolicy::Sequential => dispatch_sequential(&selected, backends, &query, timeouts, req.limit).await,
        DispatchPolicy::Fallback => dispatch_fallback(&selected, backends, &query, timeouts).await,
    };

    let any_ok = runs.iter().any(|r| matches!(r.outcome, BackendOutcome::Ok));
    if !any_ok {
        return Err(CtxError::Dispatch(DispatchError::AllBackendsFailed));
    }

    let mut merged: BTreeMap<ContextId, MergedHit> = BTreeMap::new();
    let mut backend_outcomes = BTreeMap::new();
    let mut latencies_ms = BTreeMap::new();

    for run in &runs {
        backend_outcomes.insert(run.name, run.outcome);
        latencies_ms.insert(run.name, run.elapsed.as_millis() as u64);
        for hit in &run.hits {
            let id = qa_parent.parent_of(hit.id).unwrap_or(hit.id);
            if deletion.is_deleted(id) {
                continue;
            }
            merged
                .entry(id)
                .and_modify(|m| {
                    if hit.score > m.score {
                        m.score = hit.score;
                        m.best_source = run.name;
                    }
                    if !m.sources.contains(&run.name) {
                        m.sources.push(run.name);
                    }
                })
                .or_insert_with(|| MergedHit {
                    id,
                    score: hit.score,
                    best_source: run.name,
                    sources: vec![run.name],
                });
        }
    }

    for &name in &selected {
        if !backend_outcomes.contains_key(name) {
            backend_outcomes.insert(name, BackendOutcome::Skipped);
        }
    }

    let mut hits: Vec<MergedHit> = merged.into_values().collect();
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(req.limit.max(1));

    let mut source_breakdown: BTreeMap<&'static str, usize> = BTreeMap::new();
    for hit in &hits {
        *source_breakdown.entry(hit.best_source).or_insert(0) += 1;
    }

    Ok(DispatchOutcome { hits, source_breakdown, backend_outcomes, latencies_ms })
}
