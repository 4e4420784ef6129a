//! Lock orchestration: retry-with-backoff and default TTL selection atop
//! `ctx-storage::LockManager`'s bare acquire/release mechanism. Callers
//! must not perform write-chains longer than the lease, and lock TTLs stay
//! short (seconds to minutes) regardless of a namespace's *data* retention
//! default. This module is where that policy lives, one layer above the
//! mechanism.

use ctx_core::{CtxError, CtxResult, StorageError};
use ctx_storage::{KvBackend, LockLease, LockManager};
use std::time::Duration;
use tokio::time::sleep;

/// Lock TTL for an ordinary write chain. Kept well under any namespace's
/// data retention default.
pub const DEFAULT_LEASE_MS: i64 = 30_000;

/// Bounded retry policy for acquiring a namespace lock that is currently
/// held by someone else.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff: Duration::from_millis(50) }
    }
}

/// Acquires a namespace lock with bounded retries, backing off between
/// attempts rather than busy-looping against a held lease.
pub struct LockCoordinator<'a> {
    manager: LockManager<'a>,
    retry: RetryPolicy,
}

impl<'a> LockCoordinator<'a> {
    pub fn new(kv: &'a KvBackend, retry: RetryPolicy) -> Self {
        Self { manager: LockManager::new(kv), retry }
    }

    /// Acquire a lease on `namespace` for `holder`, retrying on conflict up
    /// to `retry.max_attempts` times. Returns `Conflict` once the budget is
    /// exhausted rather than retrying forever.
    pub async fn acquire(&self, namespace: &str, holder: &str, ttl_ms: i64) -> CtxResult<LockLease> {
        let mut last_err = None;
        for attempt in 0..self.retry.max_attempts {
            match self.manager.acquire(namespace, holder, ttl_ms) {
                Ok(lease) => return Ok(lease),
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < self.retry.max_attempts {
                        sleep(self.retry.backoff).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            CtxError::Storage(StorageError::BackendUnavailable {
                backend: "lock".to_string(),
                reason: "lock acquisition exhausted its retry budget".to_string(),
            })
        }))
    }

    /// Acquire with the default write-chain lease duration.
    pub async fn acquire_default(&self, namespace: &str, holder: &str) -> CtxResult<LockLease> {
        self.acquire(namespace, holder, DEFAULT_LEASE_MS).await
    }

    pub fn release(&self, lease: &LockLease) -> CtxResult<()> {
        self.manager.release(lease)
    }
}
