//! Relationship detector. Runs on every successful context write and
//! proposes typed edges between the new context and ones that already exist,
//! without ever failing the write itself; callers persist the
//! returned edges and feed back per-edge persistence failures separately;
//! detection itself only classifies.
//!
//! Three detection passes: temporal, reference, hierarchical. Each
//! compares a pair of contexts and tags the relationship.

use chrono::{DateTime, Utc};
use ctx_core::{
    Context, ContextId, ContextType, EntityIdType, RelationshipEdge, RelationshipId,
    RelationshipType,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Minimal view of an existing context the detector needs: no text, no
/// metadata, just enough to order and identify it.
#[derive(Debug, Clone)]
pub struct ContextRef {
    pub id: ContextId,
    pub created_at: DateTime<Utc>,
}

/// Abstracts the lookups detection needs over the store without depending
/// on `ctx-storage` directly; the store orchestrator supplies a concrete
/// implementation backed by the graph/vector backends.
pub trait ContextLookup {
    /// Other contexts of the same type, in the same namespace, ordered by
    /// `created_at` ascending. Must exclude the context being detected on.
    fn same_type_and_namespace(&self, context_type: ContextType, namespace: &str) -> Vec<ContextRef>;

    /// Resolve a reference token (e.g. `"PR #42"`, `"issue #7"`, a raw
    /// context id string) to an existing context, if one matches.
    fn resolve_reference(&self, token: &str) -> Option<ContextId>;

    /// The container context for a project/sprint hierarchy, if the
    /// namespace/project/sprint combination already has one.
    fn container_for(&self, namespace: &str, project_id: Option<&str>, sprint_number: Option<&str>) -> Option<ContextId>;
}

/// Outcome of a detection pass: edges proposed plus how many candidate
/// matches were dropped as duplicates of an edge the context already has.
#[derive(Debug, Clone, Default)]
pub struct DetectionStats {
    pub candidates_considered: usize,
    pub duplicates_skipped: usize,
}

static PR_REF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bPR\s*#(\d+)").unwrap());
static ISSUE_REF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bissue\s*#(\d+)").unwrap());
static FIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfix(?:es|ed)?\s+(PR\s*#\d+|issue\s*#\d+)").unwrap());
static IMPLEMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bimplement(?:s|ed)?\s+(PR\s*#\d+|issue\s*#\d+)").unwrap());

/// Run all three detection strategies and return deduplicated edges plus
/// stats. `existing_edges` is the set of edges the new context already has
/// (e.g. from a prior detection pass on a re-index), used to enforce the
/// "duplicate (source, target, type) edge is a no-op" rule.
pub fn detect_relationships(
    new: &Context,
    text: &str,
    lookup: &dyn ContextLookup,
    existing_edges: &[RelationshipEdge],
) -> (Vec<RelationshipEdge>, DetectionStats) {
    let mut seen: HashSet<(ContextId, ContextId, RelationshipType)> =
        existing_edges.iter().map(|e| e.dedup_key()).collect();
    let mut stats = DetectionStats::default();
    let mut edges = Vec::new();

    let mut push = |edge: RelationshipEdge, stats: &mut DetectionStats| {
        stats.candidates_considered += 1;
        if seen.insert(edge.dedup_key()) {
            edges.push(edge);
        } else {
            stats.duplicates_skipped += 1;
        }
    };

    for edge in detect_temporal(new, lookup) {
        push(edge, &mut stats);
    }
    for edge in detect_references(new, text, lookup) {
        push(edge, &mut stats);
    }
    if let Some(edge) = detect_hierarchical(new, lookup) {
        push(edge, &mut stats);
    }

    (edges, stats)
}

fn new_edge(
    from: ContextId,
    to: ContextId,
    relationship_type: RelationshipType,
    reason: impl Into<String>,
    created_at: DateTime<Utc>,
) -> RelationshipEdge {
    RelationshipEdge {
        id: RelationshipId::now_v7(),
        from_context_id: from,
        to_context_id: to,
        relationship_type,
        reason: reason.into(),
        auto_detected: true,
        created_at,
    }
}

/// Temporal: the nearest same-type, same-namespace context immediately
/// before and after the new one gets `PRECEDED_BY`/`FOLLOWED_BY` edges.
/// Each neighbor is linked in both directions so consecutive contexts can
/// be walked forward or backward regardless of which one arrived last.
fn detect_temporal(new: &Context, lookup: &dyn ContextLookup) -> Vec<RelationshipEdge> {
    let mut neighbors = lookup.same_type_and_namespace(new.context_type, &new.namespace);
    neighbors.retain(|n| n.id != new.id);
    neighbors.sort_by_key(|n| n.created_at);

    let mut edges = Vec::new();
    if let Some(before) = neighbors.iter().filter(|n| n.created_at <= new.created_at).last() {
        edges.push(new_edge(
            new.id,
            before.id,
            RelationshipType::PrecededBy,
            "nearest same-type context in this namespace created earlier",
            new.created_at,
        ));
        edges.push(new_edge(
            before.id,
            new.id,
            RelationshipType::FollowedBy,
            "nearest same-type context in this namespace created later",
            new.created_at,
        ));
    }
    if let Some(after) = neighbors.iter().find(|n| n.created_at > new.created_at) {
        edges.push(new_edge(
            new.id,
            after.id,
            RelationshipType::FollowedBy,
            "nearest same-type context in this namespace created later",
            new.created_at,
        ));
        edges.push(new_edge(
            after.id,
            new.id,
            RelationshipType::PrecededBy,
            "nearest same-type context in this namespace created earlier",
            new.created_at,
        ));
    }
    edges
}

/// Reference: explicit `PR #N`/`issue #N` mentions resolve to `REFERENCES`
/// edges, upgraded to `FIXES`/`IMPLEMENTS` when fix/implement language
/// immediately precedes the mention. Both a reference edge and a
/// hierarchical edge may exist for the same pair, since they are different
/// relationship types, so neither is a duplicate of the other.
fn detect_references(new: &Context, text: &str, lookup: &dyn ContextLookup) -> Vec<RelationshipEdge> {
    let mut edges = Vec::new();

    for re in [&*PR_REF_RE, &*ISSUE_REF_RE] {
        for captures in re.captures_iter(text) {
            let token = captures.get(0).unwrap().as_str();
            let Some(target) = lookup.resolve_reference(token) else {
                continue;
            };
            if target == new.id {
                continue;
            }
            let relationship_type = if FIX_RE.is_match(text) {
                RelationshipType::Fixes
            } else if IMPLEMENT_RE.is_match(text) {
                RelationshipType::Implements
            } else {
                RelationshipType::References
            };
            edges.push(new_edge(
                new.id,
                target,
                relationship_type,
                format!("explicit mention of {token}"),
                new.created_at,
            ));
        }
    }
    edges
}

/// Hierarchical: a `project_id` or `sprint_number` in `content` links to the
/// existing container context for that project/sprint, if one exists.
fn detect_hierarchical(new: &Context, lookup: &dyn ContextLookup) -> Option<RelationshipEdge> {
    let project_id = string_field(new, "project_id");
    let sprint_number = string_field(new, "sprint_number");
    if project_id.is_none() && sprint_number.is_none() {
        return None;
    }
    let container = lookup.container_for(&new.namespace, project_id.as_deref(), sprint_number.as_deref())?;
    if container == new.id {
        return None;
    }
    Some(new_edge(
        new.id,
        container,
        RelationshipType::PartOf,
        "shares a project/sprint container with an existing context",
        new.created_at,
    ))
}

fn string_field(context: &Context, key: &str) -> Option<String> {
    match context.content.get(key) {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctx_core::{AuthorType, ContextLifecycle, compute_content_hash};
    use std::collections::BTreeMap;

    struct FakeLookup {
        neighbors: Vec<ContextRef>,
        references: Vec<(&'static str, ContextId)>,
        container: Option<ContextId>,
    }

    impl ContextLookup for FakeLookup {
        fn same_type_and_namespace(&self, _: ContextType, _: &str) -> Vec<ContextRef> {
            self.neighbors.clone()
        }
        fn resolve_reference(&self, token: &str) -> Option<ContextId> {
            self.references
                .iter()
                .find(|(t, _)| token.eq_ignore_ascii_case(t))
                .map(|(_, id)| *id)
        }
        fn container_for(&self, _: &str, _: Option<&str>, _: Option<&str>) -> Option<ContextId> {
            self.container
        }
    }

    fn ctx(content: BTreeMap<String, serde_json::Value>, created_at: DateTime<Utc>) -> Context {
        Context {
            id: ContextId::now_v7(),
            context_type: ContextType::Log,
            content,
            metadata: BTreeMap::new(),
            author: "agent-1".to_string(),
            author_type: AuthorType::Agent,
            created_at,
            namespace: "/global/".to_string(),
            embedding: None,
            vector_id: None,
            graph_id: None,
            deleted_at: None,
            purge_at: None,
            lifecycle: ContextLifecycle::Draft,
            content_hash: compute_content_hash(b""),
        }
    }

    #[test]
    fn temporal_links_nearest_neighbor_before_and_after() {
        let now = Utc::now();
        let new = ctx(BTreeMap::new(), now);
        let earlier = ContextRef { id: ContextId::now_v7(), created_at: now - chrono::Duration::hours(1) };
        let later = ContextRef { id: ContextId::now_v7(), created_at: now + chrono::Duration::hours(1) };
        let lookup = FakeLookup {
            neighbors: vec![earlier.clone(), later.clone()],
            references: vec![],
            container: None,
        };
        let (edges, _) = detect_relationships(&new, "", &lookup, &[]);
        assert!(edges
            .iter()
            .any(|e| e.relationship_type == RelationshipType::PrecededBy && e.to_context_id == earlier.id));
        assert!(edges
            .iter()
            .any(|e| e.relationship_type == RelationshipType::FollowedBy && e.to_context_id == later.id));
        // Neighbors are linked back to the new context as well.
        assert!(edges
            .iter()
            .any(|e| e.relationship_type == RelationshipType::FollowedBy
                && e.from_context_id == earlier.id
                && e.to_context_id == new.id));
        assert!(edges
            .iter()
            .any(|e| e.relationship_type == RelationshipType::PrecededBy
                && e.from_context_id == later.id
                && e.to_context_id == new.id));
    }

    #[test]
    fn fix_language_upgrades_reference_to_fixes() {
        let target = ContextId::now_v7();
        let new = ctx(BTreeMap::new(), Utc::now());
        let lookup = FakeLookup {
            neighbors: vec![],
            references: vec![("PR #42", target)],
            container: None,
        };
        let (edges, _) = detect_relationships(&new, "this fixes PR #42", &lookup, &[]);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relationship_type, RelationshipType::Fixes);
        assert_eq!(edges[0].to_context_id, target);
    }

    #[test]
    fn plain_mention_without_fix_language_is_references() {
        let target = ContextId::now_v7();
        let new = ctx(BTreeMap::new(), Utc::now());
        let lookup = FakeLookup {
            neighbors: vec![],
            references: vec![("issue #7", target)],
            container: None,
        };
        let (edges, _) = detect_relationships(&new, "see issue #7 for background", &lookup, &[]);
        assert_eq!(edges[0].relationship_type, RelationshipType::References);
    }

    #[test]
    fn hierarchical_links_to_container_when_project_id_present() {
        let container_id = ContextId::now_v7();
        let mut content = BTreeMap::new();
        content.insert("project_id".to_string(), serde_json::Value::String("proj-1".to_string()));
        let new = ctx(content, Utc::now());
        let lookup = FakeLookup { neighbors: vec![], references: vec![], container: Some(container_id) };
        let (edges, _) = detect_relationships(&new, "", &lookup, &[]);
        assert!(edges
            .iter()
            .any(|e| e.relationship_type == RelationshipType::PartOf && e.to_context_id == container_id));
    }

    #[test]
    fn duplicate_edge_against_an_existing_one_is_a_no_op() {
        let target = ContextId::now_v7();
        let new = ctx(BTreeMap::new(), Utc::now());
        let lookup = FakeLookup {
            neighbors: vec![],
            references: vec![("PR #42", target)],
            container: None,
        };
        let existing = new_edge(new.id, target, RelationshipType::References, "already detected", new.created_at);
        let (edges, stats) = detect_relationships(&new, "see PR #42", &lookup, &[existing]);
        assert!(edges.is_empty());
        assert_eq!(stats.duplicates_skipped, 1);
    }

    #[test]
    fn reference_and_hierarchical_edges_for_the_same_pair_both_survive() {
        let target = ContextId::now_v7();
        let mut content = BTreeMap::new();
        content.insert("project_id".to_string(), serde_json::Value::String("proj-1".to_string()));
        let new = ctx(content, Utc::now());
        let lookup = FakeLookup {
            neighbors: vec![],
            references: vec![("PR #42", target)],
            container: Some(target),
        };
        let (edges, _) = detect_relationships(&new, "see PR #42", &lookup, &[]);
        assert!(edges.iter().any(|e| e.relationship_type == RelationshipType::References));
        assert!(edges.iter().any(|e| e.relationship_type == RelationshipType::PartOf));
    }
}
