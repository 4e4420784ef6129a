//! In-memory directed property graph: `{Context, Event, Audit, Scratchpad}`
//! node labels plus typed `RelationshipEdge` edges between `Context` nodes.
//!
//! The restricted query interpreter ([`GraphQuery`]) is intentionally
//! narrow: label/property filters and bounded hop traversal only, no
//! general query language.

use super::{BackendAdapter, SearchHit, SearchQuery, StoreItem};
use async_trait::async_trait;
use ctx_core::{ContextId, CtxResult, HealthCheck, RelationshipEdge, StorageError};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

/// Node label in the property graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeLabel {
    Context,
    Event,
    Audit,
    Scratchpad,
}

impl Default for NodeLabel {
    fn default() -> Self {
        Self::Context
    }
}

struct Node {
    namespace: String,
    text: String,
    metadata: BTreeMap<String, serde_json::Value>,
    label: NodeLabel,
    deleted: bool,
}

/// A bounded-hop, label/property-filtered traversal request. Read-only by
/// default; the write path (adding a [`RelationshipEdge`]) is gated by the
/// caller's role in `ctx-auth`, not by this adapter.
#[derive(Debug, Clone)]
pub struct GraphQuery {
    pub start: ContextId,
    pub max_hops: usize,
    pub relationship_filter: Option<ctx_core::RelationshipType>,
}

/// In-memory property graph, one logical collection of `Context` nodes plus
/// outgoing relationship edges. Timestamp/duration values are normalized to
/// ISO-8601 strings on the way out.
pub struct GraphBackend {
    nodes: RwLock<HashMap<ContextId, Node>>,
    edges: RwLock<Vec<RelationshipEdge>>,
}

impl GraphBackend {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            edges: RwLock::new(Vec::new()),
        }
    }

    /// Add a relationship edge, deduplicating on `(from, to, type)` so a
    /// second auto-detection run on unchanged inputs never creates a
    /// duplicate.
    pub fn add_edge(&self, edge: RelationshipEdge) -> bool {
        let mut edges = self.edges.write().unwrap();
        let key = edge.dedup_key();
        if edges.iter().any(|e| e.dedup_key() == key) {
            return false;
        }
        edges.push(edge);
        true
    }

    pub fn edges_from(&self, id: ContextId) -> Vec<RelationshipEdge> {
        self.edges
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.from_context_id == id)
            .cloned()
            .collect()
    }

    /// Run a bounded-hop traversal starting at `query.start`, following only
    /// edges matching `relationship_filter` when set.
    pub fn traverse(&self, query: &GraphQuery) -> Vec<ContextId> {
        let edges = self.edges.read().unwrap();
        let mut visited = HashSet::new();
        let mut frontier = vec![query.start];
        visited.insert(query.start);
        for _ in 0..query.max_hops {
            let mut next = Vec::new();
            for node in &frontier {
                for edge in edges.iter().filter(|e| e.from_context_id == *node) {
                    if let Some(filter) = query.relationship_filter {
                        if edge.relationship_type != filter {
                            continue;
                        }
                    }
                    if visited.insert(edge.to_context_id) {
                        next.push(edge.to_context_id);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        visited.into_iter().filter(|id| *id != query.start).collect()
    }

    /// Same traversal as [`GraphBackend::traverse`], but keeping the hop
    /// count at which each node was first reached. Used by the ranker's
    /// graph-distance score component (`1 / (hops + 0.5)`).
    pub fn hop_distances(&self, query: &GraphQuery) -> HashMap<ContextId, usize> {
        let edges = self.edges.read().unwrap();
        let mut distances = HashMap::new();
        distances.insert(query.start, 0usize);
        let mut frontier = vec![query.start];
        for hop in 1..=query.max_hops {
            let mut next = Vec::new();
            for node in &frontier {
                for edge in edges.iter().filter(|e| e.from_context_id == *node) {
                    if let Some(filter) = query.relationship_filter {
                        if edge.relationship_type != filter {
                            continue;
                        }
                    }
                    if !distances.contains_key(&edge.to_context_id) {
                        distances.insert(edge.to_context_id, hop);
                        next.push(edge.to_context_id);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        distances.remove(&query.start);
        distances
    }

    pub fn soft_delete(&self, id: ContextId) -> CtxResult<()> {
        let mut nodes = self.nodes.write().unwrap();
        match nodes.get_mut(&id) {
            Some(node) => {
                node.deleted = true;
                Ok(())
            }
            None => Err(ctx_core::CtxError::Storage(StorageError::NotFound {
                entity_type: ctx_core::EntityType::Context,
                id: id.to_string(),
            })),
        }
    }

    pub fn is_deleted(&self, id: ContextId) -> bool {
        self.nodes.read().unwrap().get(&id).map(|n| n.deleted).unwrap_or(false)
    }

    /// Whether a node for `id` exists at all, soft-deleted or not.
    pub fn contains(&self, id: ContextId) -> bool {
        self.nodes.read().unwrap().contains_key(&id)
    }

    /// Snapshot of every non-deleted `Context`-labeled node, for callers
    /// (the relationship detector's lookup, the ranker's candidate facts)
    /// that need to scan stored contexts by metadata rather than by id or
    /// text match. Not part of `BackendAdapter::search`, which only
    /// supports namespace/text filtering.
    pub fn context_nodes(&self) -> Vec<GraphContextNode> {
        self.nodes
            .read()
            .unwrap()
            .iter()
            .filter(|(_, node)| !node.deleted && node.label == NodeLabel::Context)
            .map(|(id, node)| GraphContextNode {
                id: *id,
                namespace: node.namespace.clone(),
                text: node.text.clone(),
                metadata: node.metadata.clone(),
            })
            .collect()
    }

    /// Snapshot of every node carrying `label`, including soft-deleted ones.
    /// `Audit` and `Event` nodes are append-only, and soft-deleted contexts
    /// stay visible on this surface until purged.
    pub fn nodes_with_label(&self, label: NodeLabel) -> Vec<GraphContextNode> {
        self.nodes
            .read()
            .unwrap()
            .iter()
            .filter(|(_, node)| node.label == label)
            .map(|(id, node)| GraphContextNode {
                id: *id,
                namespace: node.namespace.clone(),
                text: node.text.clone(),
                metadata: node.metadata.clone(),
            })
            .collect()
    }
}

/// Read-only view of a stored `Context` node, returned by
/// [`GraphBackend::context_nodes`].
#[derive(Debug, Clone)]
pub struct GraphContextNode {
    pub id: ContextId,
    pub namespace: String,
    pub text: String,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Default for GraphBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendAdapter for GraphBackend {
    fn name(&self) -> &'static str {
        "graph"
    }

    async fn store(&self, item: &StoreItem, _deadline: Duration) -> CtxResult<()> {
        self.nodes.write().unwrap().insert(
            item.id,
            Node {
                namespace: item.namespace.clone(),
                text: item.text.clone(),
                metadata: item.metadata.clone(),
                label: item.label,
                deleted: false,
            },
        );
        Ok(())
    }

    async fn search(&self, query: &SearchQuery, _deadline: Duration) -> CtxResult<Vec<SearchHit>> {
        let nodes = self.nodes.read().unwrap();
        let mut hits: Vec<SearchHit> = nodes
            .iter()
            .filter(|(_, node)| !node.deleted)
            .filter(|(_, node)| {
                query
                    .namespace
                    .as_ref()
                    .map(|ns| &node.namespace == ns)
                    .unwrap_or(true)
            })
            .filter(|(_, node)| {
                query
                    .text
                    .as_ref()
                    .map(|needle| node.text.contains(needle.as_str()))
                    .unwrap_or(true)
            })
            .filter(|(_, node)| super::passes_filters(&query.filters, &node.namespace, &node.metadata))
            .map(|(id, _)| SearchHit {
                id: *id,
                score: 1.0,
                source: "graph",
            })
            .collect();
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn delete(&self, id: ContextId, _deadline: Duration) -> CtxResult<()> {
        self.nodes.write().unwrap().remove(&id);
        Ok(())
    }

    async fn health(&self) -> HealthCheck {
        HealthCheck::healthy("graph")
            .with_metadata("nodes", serde_json::Value::from(self.nodes.read().unwrap().len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ctx_core::RelationshipType;

    fn edge(from: ContextId, to: ContextId, ty: RelationshipType) -> RelationshipEdge {
        RelationshipEdge {
            id: ctx_core::RelationshipId::now_v7(),
            from_context_id: from,
            to_context_id: to,
            relationship_type: ty,
            reason: "test".to_string(),
            auto_detected: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn add_edge_is_idempotent_for_auto_detected_duplicates() {
        let graph = GraphBackend::new();
        let a = ContextId::now_v7();
        let b = ContextId::now_v7();
        assert!(graph.add_edge(edge(a, b, RelationshipType::DependsOn)));
        assert!(!graph.add_edge(edge(a, b, RelationshipType::DependsOn)));
        assert_eq!(graph.edges_from(a).len(), 1);
    }

    #[test]
    fn traverse_respects_max_hops() {
        let graph = GraphBackend::new();
        let a = ContextId::now_v7();
        let b = ContextId::now_v7();
        let c = ContextId::now_v7();
        graph.add_edge(edge(a, b, RelationshipType::RelatesTo));
        graph.add_edge(edge(b, c, RelationshipType::RelatesTo));

        let one_hop = GraphBackend::traverse(
            &graph,
            &GraphQuery {
                start: a,
                max_hops: 1,
                relationship_filter: None,
            },
        );
        assert_eq!(one_hop, vec![b]);

        let two_hop = GraphBackend::traverse(
            &graph,
            &GraphQuery {
                start: a,
                max_hops: 2,
                relationship_filter: None,
            },
        );
        let mut sorted = two_hop.clone();
        sorted.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn hop_distances_records_the_shortest_hop_at_which_each_node_is_reached() {
        let graph = GraphBackend::new();
        let a = ContextId::now_v7();
        let b = ContextId::now_v7();
        let c = ContextId::now_v7();
        graph.add_edge(edge(a, b, RelationshipType::RelatesTo));
        graph.add_edge(edge(b, c, RelationshipType::RelatesTo));
        graph.add_edge(edge(a, c, RelationshipType::RelatesTo));

        let distances = graph.hop_distances(&GraphQuery { start: a, max_hops: 3, relationship_filter: None });
        assert_eq!(distances.get(&b), Some(&1));
        assert_eq!(distances.get(&c), Some(&1));
        assert!(!distances.contains_key(&a));
    }

    #[tokio::test]
    async fn delete_is_idempotent_for_missing_and_repeated_ids() {
        let graph = GraphBackend::new();
        let id = ContextId::now_v7();
        graph.delete(id, Duration::from_secs(1)).await.unwrap();
        graph
            .store(
                &StoreItem {
                    id,
                    namespace: "/global/".to_string(),
                    text: "x".to_string(),
                    embedding: None,
                    metadata: BTreeMap::new(),
                    label: NodeLabel::Context,
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        graph.delete(id, Duration::from_secs(1)).await.unwrap();
        graph.delete(id, Duration::from_secs(1)).await.unwrap();
        assert!(!graph.contains(id));
    }

    #[tokio::test]
    async fn search_without_text_is_a_filter_scan_over_metadata() {
        let graph = GraphBackend::new();
        let design = ContextId::now_v7();
        let log = ContextId::now_v7();
        for (id, ty) in [(design, "design"), (log, "log")] {
            let mut metadata = BTreeMap::new();
            metadata.insert("context_type".to_string(), serde_json::json!(ty));
            graph
                .store(
                    &StoreItem {
                        id,
                        namespace: "/global/".to_string(),
                        text: String::new(),
                        embedding: None,
                        metadata,
                        label: NodeLabel::Context,
                    },
                    Duration::from_secs(1),
                )
                .await
                .unwrap();
        }

        let mut query = SearchQuery::new(10);
        query.filters = vec![ctx_core::FilterExpr::eq("context_type", serde_json::json!("design"))];
        let hits = graph.search(&query, Duration::from_secs(1)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, design);
    }

    #[tokio::test]
    async fn soft_delete_does_not_remove_node_from_graph() {
        let graph = GraphBackend::new();
        let id = ContextId::now_v7();
        graph
            .store(
                &StoreItem {
                    id,
                    namespace: "/global/".to_string(),
                    text: "x".to_string(),
                    embedding: None,
                    metadata: BTreeMap::new(),
                    label: NodeLabel::Context,
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        graph.soft_delete(id).unwrap();
        let query = SearchQuery::new(10);
        let hits = graph.search(&query, Duration::from_secs(1)).await.unwrap();
        assert!(hits.is_empty(), "soft-deleted node must be invisible to search");
        assert!(graph.nodes.read().unwrap().contains_key(&id));
    }
}
