//! Periodic sync: drains new events into the graph as
//! `Event` nodes linked to their `Context`, flushes long-retention
//! scratchpads into the graph, and deletes events past their retention
//! window. Runs as "a single logical loop with jittered interval" that
//! "flushes to completion or until a bounded timeout" on shutdown.
//!
//! A single long-lived task per role: `tokio::time::interval` with an
//! injected jitter source, clean shutdown via
//! `tokio_util::sync::CancellationToken`.

use crate::event_log::{EventLog, EventOutcome, Watermark};
use chrono::{Duration as ChronoDuration, Utc};
use ctx_core::{compute_content_hash, ContextId, EntityIdType};
use ctx_storage::{BackendAdapter, GraphBackend, KvBackend, NodeLabel, StoreItem};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Source of per-tick jitter. A trait rather than a direct `rand::random`
/// call so tests can inject a fixed sequence instead of real randomness.
pub trait JitterSource: Send + Sync {
    fn next_jitter_ms(&self) -> u64;
}

/// Uniform jitter in `[0, max_ms)`, drawn from the thread-local RNG.
pub struct RandomJitter {
    max_ms: u64,
}

impl RandomJitter {
    pub fn new(max_ms: u64) -> Self {
        Self { max_ms }
    }
}

impl JitterSource for RandomJitter {
    fn next_jitter_ms(&self) -> u64 {
        if self.max_ms == 0 {
            0
        } else {
            rand::random::<u64>() % self.max_ms
        }
    }
}

/// Fixed, cyclic jitter sequence for deterministic tests.
pub struct FixedJitter {
    sequence: Vec<u64>,
    next: AtomicU64,
}

impl FixedJitter {
    pub fn new(sequence: Vec<u64>) -> Self {
        assert!(!sequence.is_empty(), "fixed jitter sequence must be non-empty");
        Self { sequence, next: AtomicU64::new(0) }
    }
}

impl JitterSource for FixedJitter {
    fn next_jitter_ms(&self) -> u64 {
        let i = self.next.fetch_add(1, Ordering::Relaxed) as usize % self.sequence.len();
        self.sequence[i]
    }
}

/// Aggregate counters from a single sync pass, returned for observability
/// and asserted on directly in tests rather than only logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub events_drained: usize,
    pub events_pruned: usize,
    pub scratchpads_flushed: usize,
}

/// Single-task background worker that periodically reconciles the event log
/// (and, when wired, the KV scratchpads) with the graph backend.
pub struct SyncWorker {
    event_log: Arc<EventLog>,
    graph: Arc<GraphBackend>,
    kv: Option<Arc<KvBackend>>,
    stream: String,
    interval: Duration,
    jitter: Arc<dyn JitterSource>,
    retention: ChronoDuration,
    shutdown_timeout: Duration,
}

impl SyncWorker {
    pub fn new(
        event_log: Arc<EventLog>,
        graph: Arc<GraphBackend>,
        stream: impl Into<String>,
        interval: Duration,
        jitter: Arc<dyn JitterSource>,
        retention: ChronoDuration,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            event_log,
            graph,
            kv: None,
            stream: stream.into(),
            interval,
            jitter,
            retention,
            shutdown_timeout,
        }
    }

    /// Also flush live scratchpad entries into the graph on every pass, so
    /// agent working memory survives a KV store whose keys all expire.
    pub fn with_scratchpad_flush(mut self, kv: Arc<KvBackend>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Spawn the worker loop. Returns a [`CancellationToken`] the caller
    /// holds to request a graceful shutdown; the returned `JoinHandle`
    /// resolves once the loop has flushed its final tick (or the shutdown
    /// timeout elapsed, whichever comes first).
    pub fn spawn(self: Arc<Self>) -> (CancellationToken, tokio::task::JoinHandle<()>) {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut watermark = Watermark::zero();
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => {
                        let _ = tokio::time::timeout(self.shutdown_timeout, self.tick(&mut watermark)).await;
                        break;
                    }
                    _ = ticker.tick() => {
                        let jitter = self.jitter.next_jitter_ms();
                        if jitter > 0 {
                            tokio::time::sleep(Duration::from_millis(jitter)).await;
                        }
                        self.tick(&mut watermark).await;
                    }
                }
            }
        });
        (token, handle)
    }

    /// One reconciliation pass: drain new events into the graph, prune
    /// entries past retention. Never panics on a single bad event; a
    /// per-event write failure is skipped, not fatal to the pass.
    pub async fn tick(&self, watermark: &mut Watermark) -> SyncStats {
        let events = self.event_log.drain_since(&self.stream, *watermark);
        let mut drained = 0;
        for event in &events {
            if self.persist_event(event).await.is_ok() {
                drained += 1;
            }
            *watermark = Watermark { sequence: event.sequence.max(watermark.sequence) };
        }
        let cutoff = Utc::now() - self.retention;
        let pruned = self.event_log.prune_older_than(&self.stream, cutoff);
        let flushed = self.flush_scratchpads().await;
        SyncStats { events_drained: drained, events_pruned: pruned, scratchpads_flushed: flushed }
    }

    /// Persist every live scratchpad entry as a `Scratchpad`-labeled graph
    /// node. Node ids are derived from the key, so repeated passes over an
    /// unchanged entry overwrite the same node instead of accumulating
    /// duplicates.
    async fn flush_scratchpads(&self) -> usize {
        let Some(kv) = &self.kv else { return 0 };
        let Ok(keys) = kv.keys_with_prefix("scratch:") else { return 0 };
        let mut flushed = 0;
        for key in keys {
            let Ok(Some(value)) = kv.get(&key) else { continue };
            let hash = compute_content_hash(key.as_bytes());
            let node_id = ContextId::new(uuid::Uuid::from_slice(&hash[..16]).unwrap_or_default());
            let mut metadata = BTreeMap::new();
            metadata.insert("key".to_string(), serde_json::Value::String(key.clone()));
            let item = StoreItem {
                id: node_id,
                namespace: "/global/".to_string(),
                text: String::from_utf8_lossy(&value).into_owned(),
                embedding: None,
                metadata,
                label: NodeLabel::Scratchpad,
            };
            if self.graph.store(&item, Duration::from_secs(1)).await.is_ok() {
                flushed += 1;
            }
        }
        flushed
    }

    async fn persist_event(&self, event: &crate::event_log::StorageEvent) -> ctx_core::CtxResult<()> {
        let node_id = ContextId::now_v7();
        let mut metadata = BTreeMap::new();
        metadata.insert("op".to_string(), serde_json::Value::String(event.op.clone()));
        metadata.insert("actor".to_string(), serde_json::Value::String(event.actor.clone()));
        metadata.insert(
            "outcome".to_string(),
            serde_json::Value::String(match &event.outcome {
                EventOutcome::Success => "success".to_string(),
                EventOutcome::Failure { reason } => format!("failure: {reason}"),
            }),
        );
        if let Some(context_id) = event.context_id {
            metadata.insert("context_id".to_string(), serde_json::Value::String(context_id.to_string()));
        }
        let item = StoreItem {
            id: node_id,
            namespace: event.namespace.clone(),
            text: event.op.clone(),
            embedding: None,
            metadata,
            label: NodeLabel::Event,
        };
        self.graph.store(&item, Duration::from_secs(1)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::EventOutcome;

    fn worker(event_log: Arc<EventLog>, graph: Arc<GraphBackend>) -> SyncWorker {
        SyncWorker::new(
            event_log,
            graph,
            "default",
            Duration::from_secs(3600),
            Arc::new(FixedJitter::new(vec![0])),
            ChronoDuration::days(30),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn tick_drains_every_pending_event_into_the_graph() {
        let event_log = Arc::new(EventLog::new());
        let graph = Arc::new(GraphBackend::new());
        event_log.append("default", "store_context", None, "agent-1", "/global/", EventOutcome::Success);
        event_log.append("default", "delete_context", None, "agent-1", "/global/", EventOutcome::Success);
        let w = worker(event_log, graph.clone());
        let mut watermark = Watermark::zero();
        let stats = w.tick(&mut watermark).await;
        assert_eq!(stats.events_drained, 2);
    }

    #[tokio::test]
    async fn a_second_tick_with_no_new_events_drains_nothing() {
        let event_log = Arc::new(EventLog::new());
        let graph = Arc::new(GraphBackend::new());
        event_log.append("default", "store_context", None, "agent-1", "/global/", EventOutcome::Success);
        let w = worker(event_log, graph);
        let mut watermark = Watermark::zero();
        w.tick(&mut watermark).await;
        let stats = w.tick(&mut watermark).await;
        assert_eq!(stats.events_drained, 0);
    }

    #[tokio::test]
    async fn scratchpad_flush_is_idempotent_across_passes() {
        let event_log = Arc::new(EventLog::new());
        let graph = Arc::new(GraphBackend::new());
        let dir = tempfile::tempdir().unwrap();
        let kv = Arc::new(KvBackend::open(dir.path()).unwrap());
        kv.set("scratch:agent-1:task", b"step 3", 60_000).unwrap();

        let w = worker(event_log, graph.clone()).with_scratchpad_flush(kv);
        let mut watermark = Watermark::zero();
        let first = w.tick(&mut watermark).await;
        let second = w.tick(&mut watermark).await;
        assert_eq!(first.scratchpads_flushed, 1);
        assert_eq!(second.scratchpads_flushed, 1);
        assert_eq!(w.graph.nodes_with_label(NodeLabel::Scratchpad).len(), 1);
    }

    #[test]
    fn fixed_jitter_cycles_through_its_sequence() {
        let jitter = FixedJitter::new(vec![10, 20, 30]);
        let draws: Vec<u64> = (0..5).map(|_| jitter.next_jitter_ms()).collect();
        assert_eq!(draws, vec![10, 20, 30, 10, 20]);
    }

    #[tokio::test]
    async fn spawn_and_cancel_shuts_down_cleanly() {
        let event_log = Arc::new(EventLog::new());
        let graph = Arc::new(GraphBackend::new());
        let w = Arc::new(worker(event_log, graph));
        let (token, handle) = w.spawn();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
