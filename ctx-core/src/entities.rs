//! Core entity structures

use crate::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(test)]
use chrono::Utc;

/// Reference to an entity by type and ID, used in filter expressions and
/// graph query results that mix entity kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub id: String,
}

/// Lifecycle state machine for a `Context`.
///
/// Transitions are monotonic; [`ContextLifecycle::transition`] rejects any
/// move that is not a documented forward edge, including resurrection from
/// `Purged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ContextLifecycle {
    /// Request accepted, validation pending.
    Draft,
    /// Graph write succeeded.
    Stored,
    /// Vector write succeeded (optional terminal success state for the write path).
    Indexed,
    /// Hidden from search, `purge_at` set.
    SoftDeleted,
    /// Hard removed. Terminal.
    Purged,
    /// Validation failure at Draft. Terminal.
    Rejected,
}

impl ContextLifecycle {
    /// Attempt to move to `next`, returning the new state or a
    /// `ConstraintViolation` if the move is not a legal forward edge.
    pub fn transition(self, next: ContextLifecycle) -> CtxResult<ContextLifecycle> {
        use ContextLifecycle::*;
        let allowed = matches!(
            (self, next),
            (Draft, Stored)
                | (Draft, Rejected)
                | (Stored, Indexed)
                | (Stored, SoftDeleted)
                | (Indexed, SoftDeleted)
                | (SoftDeleted, Purged)
        );
        if allowed {
            Ok(next)
        } else {
            Err(CtxError::Validation(ValidationError::ConstraintViolation {
                constraint: "context_lifecycle".to_string(),
                reason: format!("illegal transition {:?} -> {:?}", self, next),
            }))
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, ContextLifecycle::Purged | ContextLifecycle::Rejected)
    }
}

/// The atomic unit of stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Context {
    pub id: ContextId,
    #[serde(rename = "type")]
    pub context_type: ContextType,
    /// Structured content. Keys are unique; insertion order is not
    /// semantically meaningful. `text`/`title`/`description`/`project_id`/
    /// `team_id`/`user_id`/`sprint_number` are recognized optional keys.
    pub content: BTreeMap<String, serde_json::Value>,
    /// Secondary mapping intended for filters (tags, source, timestamps).
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub author: String,
    pub author_type: AuthorType,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub created_at: Timestamp,
    pub namespace: String,
    pub embedding: Option<EmbeddingVector>,
    pub vector_id: Option<String>,
    pub graph_id: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub deleted_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub purge_at: Option<Timestamp>,
    pub lifecycle: ContextLifecycle,
    /// SHA-256 over the canonical JSON encoding of `content`, used by the
    /// relationship detector's idempotence check and by the store
    /// orchestrator to short-circuit re-embedding of unchanged content on a
    /// re-index call.
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub content_hash: ContentHash,
}

impl Context {
    /// Whether this context is visible to retrieval:
    /// not soft-deleted, not purged.
    pub fn is_searchable(&self) -> bool {
        self.deleted_at.is_none()
            && !matches!(
                self.lifecycle,
                ContextLifecycle::SoftDeleted | ContextLifecycle::Purged
            )
    }
}

/// A derived fact/paraphrase pair, stored as its own vectorized
/// "stitched unit" (question ⊕ answer) so paraphrased queries hit it
/// directly without re-deriving from the parent context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QaPair {
    pub id: QaPairId,
    pub parent_context_id: ContextId,
    pub question: String,
    pub answer: String,
    pub embedding: Option<EmbeddingVector>,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub created_at: Timestamp,
}

impl QaPair {
    /// The stitched unit text embedded and indexed for retrieval.
    pub fn stitched_unit(&self) -> String {
        format!("{}\n{}", self.question, self.answer)
    }
}

/// A typed directed link between two contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RelationshipEdge {
    pub id: RelationshipId,
    pub from_context_id: ContextId,
    pub to_context_id: ContextId,
    pub relationship_type: RelationshipType,
    pub reason: String,
    pub auto_detected: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub created_at: Timestamp,
}

impl RelationshipEdge {
    /// Identity used for the auto-detection idempotence check: a second
    /// detection run on unchanged inputs must not create a duplicate of the
    /// same (from, to, type) triple.
    pub fn dedup_key(&self) -> (ContextId, ContextId, RelationshipType) {
        (self.from_context_id, self.to_context_id, self.relationship_type)
    }
}

/// Keyed agent working memory in the KV store. Not indexed for
/// search; surfaced only by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ScratchpadEntry {
    pub id: ScratchpadId,
    pub agent: String,
    pub key: String,
    pub value: serde_json::Value,
    pub ttl: TtlPolicy,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub expires_at: Option<Timestamp>,
}

/// Append-only audit record for every delete/forget.
/// Written *before* the destructive operation it records, and never rolled
/// back on failure; orphan audits are preferred to silent deletions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AuditRecord {
    pub id: AuditId,
    pub context_id: ContextId,
    pub actor: String,
    pub actor_type: AuthorType,
    pub reason: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub timestamp: Timestamp,
    pub mode: DeleteMode,
    /// Required when `mode == Soft`.
    pub retention_days: Option<i32>,
}
