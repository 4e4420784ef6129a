//! Thin, synchronous adapters over [`GraphBackend`] for the injected-lookup
//! traits `ctx-expand` and `ctx-query` depend on instead of a concrete
//! backend type. The store orchestrator ([`crate::orchestrate`]) stashes
//! `context_type`/`created_at`/`project_id`/`sprint_number`/`qa_parent`
//! into `StoreItem::metadata` on write; these adapters read that same
//! metadata back out.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ctx_core::{ContextId, ContextType, EntityIdType};
use ctx_expand::{ContextLookup, ContextRef};
use ctx_query::{CandidateFacts, DeletionOracle, QaParentLookup};
use ctx_storage::{GraphBackend, VectorBackend};

/// Metadata keys the store orchestrator writes onto every `Context` graph
/// node, read back by the lookup adapters below.
pub const META_CONTEXT_TYPE: &str = "context_type";
pub const META_CREATED_AT: &str = "created_at";
pub const META_CONTENT: &str = "content";
pub const META_PROJECT_ID: &str = "project_id";
pub const META_SPRINT_NUMBER: &str = "sprint_number";
pub const META_QA_PARENT: &str = "qa_parent";

pub struct GraphLookup {
    graph: Arc<GraphBackend>,
    vector: Arc<VectorBackend>,
}

impl GraphLookup {
    pub fn new(graph: Arc<GraphBackend>, vector: Arc<VectorBackend>) -> Self {
        Self { graph, vector }
    }

    fn meta_str(value: Option<&serde_json::Value>) -> Option<String> {
        value.and_then(|v| v.as_str()).map(str::to_string)
    }

    /// The stored content mapping for `id`, as written by the store path.
    pub fn content_of(&self, id: ContextId) -> Option<serde_json::Value> {
        self.graph
            .context_nodes()
            .into_iter()
            .find(|node| node.id == id)
            .and_then(|node| node.metadata.get(META_CONTENT).cloned())
    }
}

impl ContextLookup for GraphLookup {
    fn same_type_and_namespace(&self, context_type: ContextType, namespace: &str) -> Vec<ContextRef> {
        let mut refs: Vec<ContextRef> = self
            .graph
            .context_nodes()
            .into_iter()
            .filter(|node| node.namespace == namespace)
            .filter_map(|node| {
                let ty = Self::meta_str(node.metadata.get(META_CONTEXT_TYPE))
                    .and_then(|s| ContextType::from_str(&s).ok())?;
                if ty != context_type {
                    return None;
                }
                let created_at = Self::meta_str(node.metadata.get(META_CREATED_AT))
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|dt| dt.with_timezone(&Utc))?;
                Some(ContextRef { id: node.id, created_at })
            })
            .collect();
        refs.sort_by_key(|r| r.created_at);
        refs
    }

    fn resolve_reference(&self, token: &str) -> Option<ContextId> {
        ContextId::from_str(token).ok().filter(|id| !self.graph.is_deleted(*id))
    }

    fn container_for(
        &self,
        namespace: &str,
        project_id: Option<&str>,
        sprint_number: Option<&str>,
    ) -> Option<ContextId> {
        self.graph.context_nodes().into_iter().find_map(|node| {
            if node.namespace != namespace {
                return None;
            }
            let matches_project = project_id
                .map(|p| Self::meta_str(node.metadata.get(META_PROJECT_ID)).as_deref() == Some(p))
                .unwrap_or(true);
            let matches_sprint = sprint_number
                .map(|s| Self::meta_str(node.metadata.get(META_SPRINT_NUMBER)).as_deref() == Some(s))
                .unwrap_or(true);
            (matches_project && matches_sprint).then_some(node.id)
        })
    }
}

impl DeletionOracle for GraphLookup {
    fn is_deleted(&self, id: ContextId) -> bool {
        self.graph.is_deleted(id)
    }
}

impl QaParentLookup for GraphLookup {
    /// Stitched Q&A units live only in the vector index; their parent
    /// pointer is stored as item metadata there, not as a graph node.
    fn parent_of(&self, id: ContextId) -> Option<ContextId> {
        self.vector
            .metadata_of(id)
            .and_then(|meta| Self::meta_str(meta.get(META_QA_PARENT)))
            .and_then(|s| ContextId::from_str(&s).ok())
    }
}

impl CandidateFacts for GraphLookup {
    fn text(&self, id: ContextId) -> Option<String> {
        self.graph.context_nodes().into_iter().find(|node| node.id == id).map(|node| node.text)
    }

    fn context_type(&self, id: ContextId) -> Option<ContextType> {
        self.graph
            .context_nodes()
            .into_iter()
            .find(|node| node.id == id)
            .and_then(|node| Self::meta_str(node.metadata.get(META_CONTEXT_TYPE)))
            .and_then(|s| ContextType::from_str(&s).ok())
    }

    fn created_at(&self, id: ContextId) -> Option<DateTime<Utc>> {
        self.graph
            .context_nodes()
            .into_iter()
            .find(|node| node.id == id)
            .and_then(|node| Self::meta_str(node.metadata.get(META_CREATED_AT)))
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctx_storage::{BackendAdapter, StoreItem};
    use std::collections::BTreeMap;
    use std::time::Duration;

    async fn seed(graph: &GraphBackend, ty: ContextType, ns: &str, text: &str) -> ContextId {
        let id = ContextId::now_v7();
        let mut metadata = BTreeMap::new();
        metadata.insert(META_CONTEXT_TYPE.to_string(), serde_json::json!(ty.to_string()));
        metadata.insert(META_CREATED_AT.to_string(), serde_json::json!(Utc::now().to_rfc3339()));
        graph
            .store(
                &StoreItem {
                    id,
                    namespace: ns.to_string(),
                    text: text.to_string(),
                    embedding: None,
                    metadata,
                    label: ctx_storage::NodeLabel::Context,
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn same_type_and_namespace_filters_and_sorts_by_age() {
        let graph = Arc::new(GraphBackend::new());
        let first = seed(&graph, ContextType::Sprint, "/global/", "sprint one").await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = seed(&graph, ContextType::Sprint, "/global/", "sprint two").await;
        let _other_type = seed(&graph, ContextType::Log, "/global/", "a log entry").await;

        let lookup = GraphLookup::new(graph, Arc::new(VectorBackend::new()));
        let refs = lookup.same_type_and_namespace(ContextType::Sprint, "/global/");
        assert_eq!(refs.iter().map(|r| r.id).collect::<Vec<_>>(), vec![first, second]);
    }

    #[tokio::test]
    async fn deletion_oracle_reflects_soft_delete() {
        let graph = Arc::new(GraphBackend::new());
        let id = seed(&graph, ContextType::Log, "/global/", "x").await;
        let lookup = GraphLookup::new(graph.clone(), Arc::new(VectorBackend::new()));
        assert!(!lookup.is_deleted(id));
        graph.soft_delete(id).unwrap();
        assert!(lookup.is_deleted(id));
    }
}
