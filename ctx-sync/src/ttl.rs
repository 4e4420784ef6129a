//! TTL enforcement on KV writes. Every `set` that goes
//! through this gate is resolved to a concrete millisecond duration from a
//! named [`ctx_core::TtlPolicy`]; a write with no policy is either
//! auto-corrected to the shortest safe default or counted as a violation,
//! per `enforce_missing_ttl` in config.
//!
//! `KvBackend::set` already refuses a TTL-less write at the call site;
//! this gate is the policy layer above it that maps named classes to
//! durations and tracks how often callers omit a policy.

use ctx_storage::KvBackend;
use std::sync::atomic::{AtomicU64, Ordering};

use ctx_core::{CtxResult, DurationMs, TtlConfig, TtlPolicy};

/// What to do when a caller omits a TTL policy entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingTtlBehavior {
    /// Auto-correct to [`TtlPolicy::Temporary`] (the shortest named class)
    /// and count the occurrence.
    AutoCorrect,
    /// Reject the write outright.
    Reject,
}

/// Wraps a [`KvBackend`] so every write is TTL-bearing. Counts policy
/// omissions rather than just logging them, so the sync worker's
/// periodic report (and tests) can assert on the count directly.
pub struct TtlGate<'a> {
    kv: &'a KvBackend,
    config: TtlConfig,
    on_missing: MissingTtlBehavior,
    violations: AtomicU64,
}

impl<'a> TtlGate<'a> {
    pub fn new(kv: &'a KvBackend, config: TtlConfig, on_missing: MissingTtlBehavior) -> Self {
        Self { kv, config, on_missing, violations: AtomicU64::new(0) }
    }

    /// Write `value` under `key`, resolving `policy` to a concrete TTL.
    /// `None` is handled per `on_missing`.
    pub fn set(&self, key: &str, value: &[u8], policy: Option<TtlPolicy>) -> CtxResult<()> {
        let policy = match policy {
            Some(p) => p,
            None => {
                self.violations.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, "kv write submitted with no TTL policy");
                match self.on_missing {
                    MissingTtlBehavior::AutoCorrect => TtlPolicy::Temporary,
                    MissingTtlBehavior::Reject => {
                        return Err(ctx_core::CtxError::Validation(
                            ctx_core::ValidationError::RequiredFieldMissing { field: "ttl".to_string() },
                        ))
                    }
                }
            }
        };
        let ttl_ms: DurationMs = policy.resolve_ms(&self.config).unwrap_or(self.config.session_ms);
        self.kv.set(key, value, ttl_ms).map_err(Into::into)
    }

    /// Number of writes that reached this gate without an explicit policy.
    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }
}
