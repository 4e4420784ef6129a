//! Roles, principals, the capability matrix, and the delete/forget audit
//! trail.
//!
//! Every principal authenticates with one opaque API key loaded from
//! configuration at startup, never minted or refreshed at runtime. The
//! [`ApiKeyStore`] resolves a presented key to a [`Principal`], and the
//! capability matrix on [`Role`] decides what that principal may do.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ctx_core::{
    AuditId, AuthConfigSection, AuthError, AuthorType, ContextId, CtxError, CtxResult, EntityIdType,
    Role,
};
use ctx_storage::{BackendAdapter, NodeLabel, StoreItem};
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// CAPABILITIES
// ============================================================================

/// A single permission a tool call requires. Enumerated rather than left
/// as a string so an unknown capability is a compile error, not a silent
/// `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    RetrieveContext,
    QueryGraphRead,
    QueryGraphWrite,
    Tools,
    Health,
    GetAgentState,
    StoreContext,
    UpdateScratchpad,
    ForgetContext,
    DeleteContext,
}

/// The role → capability matrix as a pure function, kept as a trait on
/// [`Role`] (defined in `ctx-core`, where config needs it as plain data)
/// rather than an inherent method: the matrix is policy, the enum is fact.
pub trait CapabilityMatrix {
    fn can(&self, capability: Capability) -> bool;
}

impl CapabilityMatrix for Role {
    fn can(&self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Role::Guest => matches!(capability, Tools | Health),
            Role::Reader => matches!(
                capability,
                RetrieveContext | QueryGraphRead | Tools | Health | GetAgentState
            ),
            Role::Writer => matches!(
                capability,
                RetrieveContext
                    | QueryGraphRead
                    | Tools
                    | Health
                    | GetAgentState
                    | StoreContext
                    | UpdateScratchpad
                    | ForgetContext
            ),
            // DeleteContext is listed here because admin is the only role
            // that can ever hold it; whether a given admin principal may
            // actually exercise it still depends on `is_agent` and is
            // checked separately in `Principal::authorize`.
            Role::Admin => matches!(
                capability,
                RetrieveContext
                    | QueryGraphRead
                    | QueryGraphWrite
                    | Tools
                    | Health
                    | GetAgentState
                    | StoreContext
                    | UpdateScratchpad
                    | ForgetContext
                    | DeleteContext
            ),
        }
    }
}

// ============================================================================
// PRINCIPAL
// ============================================================================

/// The authenticated party behind a request: a human operator or an agent,
/// carrying the role resolved from its API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub role: Role,
    pub is_agent: bool,
}

impl Principal {
    pub fn author_type(&self) -> AuthorType {
        if self.is_agent {
            AuthorType::Agent
        } else {
            AuthorType::Human
        }
    }

    /// Check `capability`, with the one capability-matrix exception the
    /// matrix itself can't express: `DeleteContext` is admin-only *and*
    /// human-only.
    pub fn authorize(&self, capability: Capability) -> CtxResult<()> {
        if capability == Capability::DeleteContext && self.is_agent {
            return Err(CtxError::Auth(AuthError::AgentCannotHardDelete));
        }
        if !self.role.can(capability) {
            return Err(CtxError::Auth(AuthError::Forbidden {
                principal_id: self.id.clone(),
                role: self.role.to_string(),
                capability: format!("{:?}", capability),
            }));
        }
        Ok(())
    }
}

/// Resolve the `(author, author_type)` a stored context should carry.
///
/// When the caller omits both fields they default to the authenticated
/// principal. When the caller supplies `author_type`, an agent principal
/// is not allowed to claim `human`; the server silently overrides it
/// rather than rejecting the call, so a misbehaving agent can't launder its
/// writes through a false attribution.
pub fn resolve_author(
    principal: &Principal,
    requested_author: Option<String>,
    requested_author_type: Option<AuthorType>,
) -> (String, AuthorType) {
    let author = requested_author.unwrap_or_else(|| principal.id.clone());
    let author_type = match requested_author_type {
        Some(AuthorType::Human) if principal.is_agent => AuthorType::Agent,
        Some(claimed) => claimed,
        None => principal.author_type(),
    };
    (author, author_type)
}

// ============================================================================
// API KEY STORE
// ============================================================================

/// An opaque API key, compared by its exposed value. Wrapping it keeps the
/// key out of `Debug`/log output by accident.
#[derive(Clone)]
struct ApiKey(SecretString);

impl PartialEq for ApiKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.expose_secret() == other.0.expose_secret()
    }
}

impl Eq for ApiKey {}

impl Hash for ApiKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.expose_secret().hash(state)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// The set of valid API keys, loaded once from configuration at startup.
/// There is no runtime issuance or revocation endpoint; a key
/// added or removed requires a config reload and process restart, same
/// policy as the rest of `CtxConfig`.
pub struct ApiKeyStore {
    keys: HashMap<ApiKey, Principal>,
}

impl ApiKeyStore {
    pub fn from_config(section: &AuthConfigSection) -> Self {
        let keys = section
            .api_keys
            .iter()
            .map(|entry| {
                let principal = Principal {
                    id: entry.principal_id.clone(),
                    role: entry.role,
                    is_agent: entry.is_agent,
                };
                (ApiKey(SecretString::new(entry.key.clone().into())), principal)
            })
            .collect();
        Self { keys }
    }

    /// Resolve a presented key to its principal. Unknown keys reject with a
    /// single `auth_required` kind, never a reason that would help an
    /// attacker distinguish "wrong key" from "key for a disabled account".
    pub fn authenticate(&self, presented: &str) -> CtxResult<Principal> {
        let needle = ApiKey(SecretString::new(presented.to_string().into()));
        match self.keys.get(&needle) {
            Some(principal) => Ok(principal.clone()),
            None => {
                tracing::warn!(key_len = presented.len(), "rejected unknown api key");
                Err(CtxError::Auth(AuthError::Unauthenticated))
            }
        }
    }
}

// ============================================================================
// AUDIT LOG
// ============================================================================

/// Soft delete (`forget_context`, retention-bounded) or hard delete
/// (`delete_context`, human-admin-only, irreversible).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditMode {
    Soft,
    Hard,
}

impl fmt::Display for AuditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if matches!(self, AuditMode::Soft) { "soft" } else { "hard" })
    }
}

/// One append-only audit entry. Every delete/forget call writes one of
/// these to the graph (label `Audit`) *before* the destructive op runs, so
/// an orphan audit record (written, then the deletion itself fails) is
/// preferred over a silent deletion with no trail.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub id: AuditId,
    pub context_id: ContextId,
    pub actor: String,
    pub actor_type: AuthorType,
    pub role: Role,
    pub mode: AuditMode,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 1-year retention floor for audit records.
pub const AUDIT_RETENTION_DAYS: i64 = 365;

/// The namespace every audit record is written under, distinct from any
/// context namespace so a namespace-scoped `query_graph` call never
/// surfaces audit entries by accident.
pub const AUDIT_NAMESPACE: &str = "/system/audit/";

/// Where [`AuditRecord`]s go. A trait, not a concrete dependency on
/// `GraphBackend`, for the same reason `ctx-query`'s `DeletionOracle` is a
/// trait: callers that only need to verify "was this recorded" (tests, a
/// future export tool) shouldn't have to construct a real graph.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: AuditRecord, deadline: Duration) -> CtxResult<()>;
}

/// Writes audit records to a graph-shaped [`BackendAdapter`], the
/// production implementation.
pub struct GraphAuditLog {
    backend: Arc<dyn BackendAdapter>,
}

impl GraphAuditLog {
    pub fn new(backend: Arc<dyn BackendAdapter>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl AuditLog for GraphAuditLog {
    async fn record(&self, entry: AuditRecord, deadline: Duration) -> CtxResult<()> {
        let purge_at = entry.created_at + ChronoDuration::days(AUDIT_RETENTION_DAYS);
        let mut metadata = BTreeMap::new();
        metadata.insert("context_id".to_string(), serde_json::json!(entry.context_id.to_string()));
        metadata.insert("actor".to_string(), serde_json::json!(entry.actor));
        metadata.insert("actor_type".to_string(), serde_json::json!(entry.actor_type.to_string()));
        metadata.insert("role".to_string(), serde_json::json!(entry.role.to_string()));
        metadata.insert("mode".to_string(), serde_json::json!(entry.mode.to_string()));
        metadata.insert("reason".to_string(), serde_json::json!(entry.reason));
        metadata.insert("created_at".to_string(), serde_json::json!(entry.created_at.to_rfc3339()));
        metadata.insert("purge_at".to_string(), serde_json::json!(purge_at.to_rfc3339()));

        let item = StoreItem {
            id: ContextId::new(entry.id.as_uuid()),
            namespace: AUDIT_NAMESPACE.to_string(),
            text: format!("{} delete of {}", entry.mode, entry.context_id),
            embedding: None,
            metadata,
            label: NodeLabel::Audit,
        };
        self.backend.store(&item, deadline).await
    }
}

/// An audit log that records nothing, for callers (unit tests exercising
/// unrelated logic) that don't care about the audit trail.
pub struct NullAuditLog;

#[async_trait]
impl AuditLog for NullAuditLog {
    async fn record(&self, _entry: AuditRecord, _deadline: Duration) -> CtxResult<()> {
        Ok(())
    }
}
