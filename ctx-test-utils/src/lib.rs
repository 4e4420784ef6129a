//! Test utilities for the context memory workspace:
//! - Proptest generators for the entity types
//! - A mock embedding provider
//! - Fixtures for common scenarios
//! - Custom assertions for error-kind checking

// Re-export core types for convenience
pub use ctx_core::{
    compute_content_hash, AuditRecord, AuthorType, ContentHash, Context, ContextLifecycle,
    ContextType, CtxConfig, CtxError, CtxResult, DeleteMode, DispatchPolicy, EmbeddingVector,
    EntityIdType, QaPair, RelationshipEdge, RelationshipType, Role, ScratchpadEntry, SearchMode,
    Timestamp, TtlPolicy,
    // Strongly-typed entity IDs
    AuditId, ContextId, EventId, LockId, QaPairId, RelationshipId, ScratchpadId,
};

use async_trait::async_trait;
use ctx_embed::EmbeddingProvider;

// ============================================================================
// MOCK PROVIDERS
// ============================================================================

/// Deterministic embedding provider for tests: hashes bytes into a
/// fixed-size vector and normalizes. Same text always embeds identically.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    model_id: String,
    dimensions: i32,
}

impl MockEmbeddingProvider {
    pub fn new(model_id: impl Into<String>, dimensions: i32) -> Self {
        Self {
            model_id: model_id.into(),
            dimensions,
        }
    }

    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let mut data = vec![0.0f32; self.dimensions as usize];

        for (i, byte) in text.bytes().enumerate() {
            let idx = i % self.dimensions as usize;
            data[idx] += (byte as f32) / 255.0;
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
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> CtxResult<EmbeddingVector> {
        let data = self.generate_embedding(text);
        Ok(EmbeddingVector::new(data, self.model_id.clone()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> CtxResult<Vec<EmbeddingVector>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimensions(&self) -> i32 {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

use chrono::Utc;
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating the domain's entity types.

    use super::*;
    use proptest::prelude::*;

    // === Identity Type Generators ===

    /// Generate a random UUID (for generic ID generation).
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a random ContextId.
    pub fn arb_context_id() -> impl Strategy<Value = ContextId> {
        arb_uuid().prop_map(ContextId::new)
    }

    /// Generate a random QaPairId.
    pub fn arb_qa_pair_id() -> impl Strategy<Value = QaPairId> {
        arb_uuid().prop_map(QaPairId::new)
    }

    /// Generate a random RelationshipId.
    pub fn arb_relationship_id() -> impl Strategy<Value = RelationshipId> {
        arb_uuid().prop_map(RelationshipId::new)
    }

    /// Generate a random ScratchpadId.
    pub fn arb_scratchpad_id() -> impl Strategy<Value = ScratchpadId> {
        arb_uuid().prop_map(ScratchpadId::new)
    }

    /// Generate a random AuditId.
    pub fn arb_audit_id() -> impl Strategy<Value = AuditId> {
        arb_uuid().prop_map(AuditId::new)
    }

    /// Generate a Timestamp within a reasonable range (2020-2030).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// Generate a ContentHash (32 bytes).
    pub fn arb_content_hash() -> impl Strategy<Value = ContentHash> {
        any::<[u8; 32]>()
    }

    // === Enum Generators ===

    /// Generate a ContextType variant.
    pub fn arb_context_type() -> impl Strategy<Value = ContextType> {
        prop_oneof![
            Just(ContextType::Design),
            Just(ContextType::Decision),
            Just(ContextType::Trace),
            Just(ContextType::Sprint),
            Just(ContextType::Log),
            Just(ContextType::Test),
        ]
    }

    /// Generate an AuthorType variant.
    pub fn arb_author_type() -> impl Strategy<Value = AuthorType> {
        prop_oneof![Just(AuthorType::Human), Just(AuthorType::Agent)]
    }

    /// Generate a Role variant.
    pub fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::Guest),
            Just(Role::Reader),
            Just(Role::Writer),
            Just(Role::Admin),
        ]
    }

    /// Generate a RelationshipType variant.
    pub fn arb_relationship_type() -> impl Strategy<Value = RelationshipType> {
        prop_oneof![
            Just(RelationshipType::RelatesTo),
            Just(RelationshipType::DependsOn),
            Just(RelationshipType::PrecededBy),
            Just(RelationshipType::FollowedBy),
            Just(RelationshipType::PartOf),
            Just(RelationshipType::Implements),
            Just(RelationshipType::Fixes),
            Just(RelationshipType::References),
        ]
    }

    /// Generate a TtlPolicy variant.
    pub fn arb_ttl_policy() -> impl Strategy<Value = TtlPolicy> {
        prop_oneof![
            Just(TtlPolicy::Scratchpad),
            Just(TtlPolicy::Session),
            Just(TtlPolicy::Cache),
            Just(TtlPolicy::Temporary),
            Just(TtlPolicy::Persistent),
            (1i64..86400000).prop_map(TtlPolicy::Duration),
        ]
    }

    /// Generate a SearchMode variant.
    pub fn arb_search_mode() -> impl Strategy<Value = SearchMode> {
        prop_oneof![
            Just(SearchMode::Vector),
            Just(SearchMode::Graph),
            Just(SearchMode::Text),
            Just(SearchMode::Kv),
            Just(SearchMode::Hybrid),
            Just(SearchMode::Auto),
        ]
    }

    /// Generate a DispatchPolicy variant.
    pub fn arb_dispatch_policy() -> impl Strategy<Value = DispatchPolicy> {
        prop_oneof![
            Just(DispatchPolicy::Parallel),
            Just(DispatchPolicy::Sequential),
            Just(DispatchPolicy::Fallback),
            Just(DispatchPolicy::Smart),
        ]
    }

    /// Generate a DeleteMode variant.
    pub fn arb_delete_mode() -> impl Strategy<Value = DeleteMode> {
        prop_oneof![Just(DeleteMode::Soft), Just(DeleteMode::Hard)]
    }

    // === Struct Generators ===

    /// Generate one of the four valid namespace path shapes.
    pub fn arb_namespace() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("/global/".to_string()),
            "[a-z0-9]{1,12}".prop_map(|id| format!("/project/{id}/")),
            "[a-z0-9]{1,12}".prop_map(|id| format!("/team/{id}/")),
            "[a-z0-9]{1,12}".prop_map(|id| format!("/user/{id}/")),
        ]
    }

    /// Generate an EmbeddingVector with specified dimensions.
    pub fn arb_embedding_vector(dimensions: usize) -> impl Strategy<Value = EmbeddingVector> {
        (
            prop::collection::vec(-1.0f32..1.0f32, dimensions),
            "[a-z]{3,10}",
        )
            .prop_map(move |(data, model_id)| EmbeddingVector::new(data, model_id))
    }

    /// Generate an EmbeddingVector with random dimensions (64-1536).
    pub fn arb_embedding_vector_any() -> impl Strategy<Value = EmbeddingVector> {
        (64usize..1536).prop_flat_map(arb_embedding_vector)
    }

    /// Generate a content mapping with a `text` key and a handful of extras.
    pub fn arb_content() -> impl Strategy<Value = BTreeMap<String, serde_json::Value>> {
        (
            "[a-zA-Z0-9 .,!?]{1,200}",
            prop::collection::btree_map(
                "[a-z_]{1,16}".prop_map(String::from),
                "[a-zA-Z0-9 ]{0,40}".prop_map(String::from),
                0..4,
            ),
        )
            .prop_map(|(text, extras)| {
                let mut content: BTreeMap<String, serde_json::Value> = extras
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                content.insert("text".to_string(), serde_json::Value::String(text));
                content
            })
    }

    /// Generate a Context struct. Lifecycle is always `Stored` and the
    /// soft-delete markers are unset; tests that need those states set them
    /// explicitly.
    pub fn arb_context() -> impl Strategy<Value = Context> {
        (
            arb_context_id(),
            arb_context_type(),
            arb_content(),
            "[a-z0-9-]{1,24}",
            arb_author_type(),
            arb_timestamp(),
            arb_namespace(),
        )
            .prop_map(
                |(id, context_type, content, author, author_type, created_at, namespace)| {
                    let canonical = serde_json::to_vec(&content).unwrap_or_default();
                    Context {
                        id,
                        context_type,
                        content,
                        metadata: BTreeMap::new(),
                        author,
                        author_type,
                        created_at,
                        namespace,
                        embedding: None,
                        vector_id: None,
                        graph_id: None,
                        deleted_at: None,
                        purge_at: None,
                        lifecycle: ContextLifecycle::Stored,
                        content_hash: compute_content_hash(&canonical),
                    }
                },
            )
    }

    /// Generate a QaPair for a given parent context.
    pub fn arb_qa_pair(parent_context_id: ContextId) -> impl Strategy<Value = QaPair> {
        (
            arb_qa_pair_id(),
            "[a-zA-Z0-9 ]{1,80}\\?",
            "[a-zA-Z0-9 .,]{1,120}",
            arb_timestamp(),
        )
            .prop_map(move |(id, question, answer, created_at)| QaPair {
                id,
                parent_context_id,
                question,
                answer,
                embedding: None,
                created_at,
            })
    }

    /// Generate a RelationshipEdge between two given contexts.
    pub fn arb_relationship_edge(
        from: ContextId,
        to: ContextId,
    ) -> impl Strategy<Value = RelationshipEdge> {
        (
            arb_relationship_id(),
            arb_relationship_type(),
            "[a-zA-Z0-9 ]{1,60}",
            any::<bool>(),
            arb_timestamp(),
        )
            .prop_map(
                move |(id, relationship_type, reason, auto_detected, created_at)| {
                    RelationshipEdge {
                        id,
                        from_context_id: from,
                        to_context_id: to,
                        relationship_type,
                        reason,
                        auto_detected,
                        created_at,
                    }
                },
            )
    }

    /// Generate a ScratchpadEntry.
    pub fn arb_scratchpad_entry() -> impl Strategy<Value = ScratchpadEntry> {
        (
            arb_scratchpad_id(),
            "[a-z0-9-]{1,24}",
            "[a-z0-9_]{1,32}",
            "[a-zA-Z0-9 ]{0,80}",
            arb_ttl_policy(),
            arb_timestamp(),
        )
            .prop_map(|(id, agent, key, value, ttl, created_at)| ScratchpadEntry {
                id,
                agent,
                key,
                value: serde_json::Value::String(value),
                ttl,
                created_at,
                expires_at: None,
            })
    }

    /// Generate an AuditRecord. `retention_days` is populated only for
    /// soft deletes, matching what the tool surface writes.
    pub fn arb_audit_record() -> impl Strategy<Value = AuditRecord> {
        (
            arb_audit_id(),
            arb_context_id(),
            "[a-z0-9-]{1,24}",
            arb_author_type(),
            prop::option::of("[a-zA-Z0-9 ]{1,60}".prop_map(String::from)),
            arb_timestamp(),
            arb_delete_mode(),
            1i32..90,
        )
            .prop_map(
                |(id, context_id, actor, actor_type, reason, timestamp, mode, days)| AuditRecord {
                    id,
                    context_id,
                    actor,
                    actor_type,
                    reason,
                    timestamp,
                    mode,
                    retention_days: matches!(mode, DeleteMode::Soft).then_some(days),
                },
            )
    }

    /// Generate a Principal.
    pub fn arb_principal() -> impl Strategy<Value = ctx_auth::Principal> {
        ("[a-z0-9-]{1,24}", arb_role(), any::<bool>()).prop_map(|(id, role, is_agent)| {
            ctx_auth::Principal { id, role, is_agent }
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Hand-built values for tests that need one known-good instance rather
    //! than a generated population.

    use super::*;
    use ctx_query::Backends;
    use ctx_storage::{GraphBackend, KvBackend, TextBackend, VectorBackend};
    use std::sync::Arc;

    /// A config that passes validation, with in-memory endpoints and the
    /// standard trio of test API keys (admin human, writer agent, reader).
    pub fn minimal_config() -> CtxConfig {
        CtxConfig::default_for_tests()
    }

    /// A plain `log` context in the global namespace carrying `text`.
    pub fn log_context(text: &str) -> Context {
        context_of(ContextType::Log, text, "/global/")
    }

    /// A `sprint` context in the given namespace.
    pub fn sprint_context(text: &str, namespace: &str) -> Context {
        context_of(ContextType::Sprint, text, namespace)
    }

    pub fn context_of(context_type: ContextType, text: &str, namespace: &str) -> Context {
        let mut content = BTreeMap::new();
        content.insert(
            "text".to_string(),
            serde_json::Value::String(text.to_string()),
        );
        let canonical = serde_json::to_vec(&content).unwrap_or_default();
        Context {
            id: ContextId::now_v7(),
            context_type,
            content,
            metadata: BTreeMap::new(),
            author: "tester".to_string(),
            author_type: AuthorType::Human,
            created_at: Utc::now(),
            namespace: namespace.to_string(),
            embedding: None,
            vector_id: None,
            graph_id: None,
            deleted_at: None,
            purge_at: None,
            lifecycle: ContextLifecycle::Stored,
            content_hash: compute_content_hash(&canonical),
        }
    }

    /// A human principal with the admin role (may hard-delete).
    pub fn human_admin() -> ctx_auth::Principal {
        ctx_auth::Principal {
            id: "admin-1".to_string(),
            role: Role::Admin,
            is_agent: false,
        }
    }

    /// An agent principal with the writer role.
    pub fn agent_writer() -> ctx_auth::Principal {
        ctx_auth::Principal {
            id: "agent-1".to_string(),
            role: Role::Writer,
            is_agent: true,
        }
    }

    /// A human principal with the reader role.
    pub fn human_reader() -> ctx_auth::Principal {
        ctx_auth::Principal {
            id: "reader-1".to_string(),
            role: Role::Reader,
            is_agent: false,
        }
    }

    /// The full in-process backend set, with the KV store on a temp dir.
    /// Keep the returned `TempDir` alive for the duration of the test.
    pub fn backends() -> (Backends, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("failed to create temp dir for kv backend");
        let kv = KvBackend::open(dir.path()).expect("failed to open kv backend");
        let backends = Backends {
            vector: Arc::new(VectorBackend::new()),
            graph: Arc::new(GraphBackend::new()),
            text: Arc::new(TextBackend::new()),
            kv: Arc::new(kv),
        };
        (backends, dir)
    }

    /// A deterministic normalized embedding for `dimensions`.
    pub fn test_embedding(dimensions: usize) -> EmbeddingVector {
        let value = 1.0 / (dimensions as f32).sqrt();
        EmbeddingVector::new(vec![value; dimensions], "test-model".to_string())
    }

    /// A unit vector along one axis, for exact-similarity tests.
    pub fn unit_embedding(dimensions: usize, axis: usize) -> EmbeddingVector {
        let mut data = vec![0.0f32; dimensions];
        if axis < dimensions {
            data[axis] = 1.0;
        }
        EmbeddingVector::new(data, "test-model".to_string())
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over `CtxResult` and domain values, for error-kind checks
    //! that would otherwise be repeated match blocks in every test.

    use super::*;

    pub fn assert_ok<T: std::fmt::Debug>(result: &CtxResult<T>) {
        assert!(result.is_ok(), "expected Ok, got {:?}", result);
    }

    pub fn assert_err<T: std::fmt::Debug>(result: &CtxResult<T>) {
        assert!(result.is_err(), "expected Err, got {:?}", result);
    }

    /// The error's abstract kind (`validation`, `not_found`,
    /// `backend_unavailable`, ...) matches `expected`.
    pub fn assert_kind<T: std::fmt::Debug>(result: &CtxResult<T>, expected: &str) {
        match result {
            Ok(value) => panic!("expected {expected} error, got Ok({value:?})"),
            Err(err) => assert_eq!(
                err.kind(),
                expected,
                "expected {expected}, got {} ({err})",
                err.kind()
            ),
        }
    }

    pub fn assert_valid_embedding(embedding: &EmbeddingVector) {
        assert_eq!(
            embedding.dimensions as usize,
            embedding.data.len(),
            "dimensions field disagrees with data length"
        );
        assert!(
            embedding.data.iter().all(|x| x.is_finite()),
            "embedding contains non-finite values"
        );
    }

    pub fn assert_same_dimensions(a: &EmbeddingVector, b: &EmbeddingVector) {
        assert_eq!(a.dimensions, b.dimensions, "embedding dimensions differ");
    }

    /// Searchability matches the lifecycle/soft-delete markers.
    pub fn assert_hidden(context: &Context) {
        assert!(
            !context.is_searchable(),
            "context {} should be hidden from retrieval",
            context.id
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn mock_provider_is_deterministic() {
        let provider = MockEmbeddingProvider::new("mock", 64);
        let a = provider.embed("the same text").await.unwrap();
        let b = provider.embed("the same text").await.unwrap();
        assert_eq!(a.data, b.data);
        assertions::assert_valid_embedding(&a);
    }

    #[tokio::test]
    async fn mock_provider_output_is_normalized() {
        let provider = MockEmbeddingProvider::new("mock", 32);
        let v = provider.embed("normalize me").await.unwrap();
        let norm: f32 = v.data.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn fixture_config_validates() {
        fixtures::minimal_config().validate().unwrap();
    }

    #[test]
    fn fixture_principals_match_their_roles() {
        assert!(!fixtures::human_admin().is_agent);
        assert!(fixtures::agent_writer().is_agent);
        assert_eq!(fixtures::human_reader().role, Role::Reader);
    }

    proptest! {
        #[test]
        fn generated_contexts_are_searchable(context in generators::arb_context()) {
            prop_assert!(context.is_searchable());
        }

        #[test]
        fn generated_namespaces_parse(ns in generators::arb_namespace()) {
            prop_assert!(ctx_storage::Namespace::parse(&ns).is_ok());
        }

        #[test]
        fn generated_embeddings_are_consistent(v in generators::arb_embedding_vector_any()) {
            assertions::assert_valid_embedding(&v);
        }

        #[test]
        fn soft_audit_records_carry_retention(record in generators::arb_audit_record()) {
            match record.mode {
                DeleteMode::Soft => prop_assert!(record.retention_days.is_some()),
                DeleteMode::Hard => prop_assert!(record.retention_days.is_none()),
            }
        }
    }
}
