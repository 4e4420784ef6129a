//! Error types for context-memory operations

use crate::*;
use thiserror::Error;

/// Storage layer errors (backend adapters).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: String },

    #[error("write failed for {entity_type:?}: {reason}")]
    WriteFailed { entity_type: EntityType, reason: String },

    #[error("backend unavailable: {backend}: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("backend call to {backend} timed out after {deadline_ms}ms")]
    DeadlineExceeded { backend: String, deadline_ms: i64 },

    #[error("index error on {index_name}: {reason}")]
    IndexError { index_name: String, reason: String },

    #[error("storage lock poisoned")]
    LockPoisoned,
}

/// Embedding service errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmbedError {
    #[error("no embedding provider configured")]
    ProviderNotConfigured,

    #[error("request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("embedding self-test failed: {reason}")]
    SelfTestFailed { reason: String },

    #[error("embedding failed: {reason}")]
    EmbeddingFailed { reason: String },
}

/// Fact/Q&A expansion and relationship detection errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpandError {
    #[error("expansion failed for context {context_id}: {reason}")]
    ExpansionFailed { context_id: String, reason: String },

    #[error("relationship detection failed for context {context_id}: {reason}")]
    DetectionFailed { context_id: String, reason: String },
}

/// Query dispatch and ranking errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("every selected backend failed for this query")]
    AllBackendsFailed,

    #[error("unsupported search mode: {mode}")]
    UnsupportedMode { mode: String },

    #[error("query rewrite budget exceeded: requested {requested}, max {max}")]
    RewriteBudgetExceeded { requested: usize, max: usize },
}

/// Validation errors, short-circuit before any side effects.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("unknown field: {field}")]
    UnknownField { field: String },

    #[error("constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("no config file found in any candidate location")]
    NotFound,
}

/// Vector/embedding geometry errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VectorError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: i32, got: i32 },

    #[error("invalid vector: {reason}")]
    InvalidVector { reason: String },
}

/// Auth/audit errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    #[error("missing or unknown API key")]
    Unauthenticated,

    #[error("principal {principal_id} (role {role}) lacks capability {capability}")]
    Forbidden {
        principal_id: String,
        role: String,
        capability: String,
    },

    #[error("agent principals cannot perform hard delete")]
    AgentCannotHardDelete,

    #[error("rate limit exceeded for principal {principal_id}")]
    RateLimited { principal_id: String },
}

/// Master error type for all context-memory operations.
///
/// Each variant maps to exactly one abstract error kind
/// (`validation`, `auth_required`/`auth_forbidden`, `not_found`,
/// `backend_unavailable`, `partial_success`, `rate_limited`, `conflict`,
/// `internal`) via [`CtxError::kind`].
#[derive(Debug, Clone, Error)]
pub enum CtxError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("embed error: {0}")]
    Embed(#[from] EmbedError),

    #[error("expand error: {0}")]
    Expand(#[from] ExpandError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("namespace lock held: {namespace}")]
    Conflict { namespace: String },

    #[error("partial success: {reason}")]
    PartialSuccess { reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for context-memory operations.
pub type CtxResult<T> = Result<T, CtxError>;

impl CtxError {
    /// Abstract error kind for the response envelope's `error.kind` field;
    /// deliberately coarser than the `Display` message.
    pub fn kind(&self) -> &'static str {
        match self {
            CtxError::Validation(_) => "validation",
            CtxError::Auth(AuthError::Unauthenticated) => "auth_required",
            CtxError::Auth(AuthError::Forbidden { .. })
            | CtxError::Auth(AuthError::AgentCannotHardDelete) => "auth_forbidden",
            CtxError::Auth(AuthError::RateLimited { .. }) => "rate_limited",
            CtxError::Storage(StorageError::NotFound { .. }) => "not_found",
            CtxError::Storage(StorageError::BackendUnavailable { .. })
            | CtxError::Storage(StorageError::DeadlineExceeded { .. })
            | CtxError::Embed(_)
            | CtxError::Dispatch(DispatchError::AllBackendsFailed) => "backend_unavailable",
            CtxError::Dispatch(DispatchError::UnsupportedMode { .. })
            | CtxError::Dispatch(DispatchError::RewriteBudgetExceeded { .. }) => "validation",
            CtxError::Conflict { .. } => "conflict",
            CtxError::PartialSuccess { .. } => "partial_success",
            _ => "internal",
        }
    }
}
