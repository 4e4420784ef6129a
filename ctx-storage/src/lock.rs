//! Namespace lock manager: TTL-bounded mutual exclusion on namespace
//! writes, backed by the KV backend's mandatory-TTL `set`.
//!
//! An opaque token is returned on acquire and required again on release.
//! The KV backend's own expiry tracking is the correctness mechanism: a
//! lock is "held" exactly as long as its KV key has not expired, so there
//! is no separate
//! sweep process to keep locks from leaking.

use crate::backend::KvBackend;
use crate::backend::kv::lock_key;
use ctx_core::{CtxError, CtxResult, DurationMs, EntityIdType, LockId, StorageError};
use serde::{Deserialize, Serialize};

/// An opaque lease returned by [`LockManager::acquire`]. Only the holder
/// that minted it can release it; releasing a lease some other holder now
/// owns is refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockLease {
    pub token: LockId,
    pub namespace: String,
    pub holder: String,
}

/// TTL-bounded namespace lock manager, wrapping a [`KvBackend`]. Expiry is
/// the sole correctness mechanism; there is no explicit unlock
/// sweep; an expired lease's key simply reads back absent.
pub struct LockManager<'a> {
    kv: &'a KvBackend,
}

impl<'a> LockManager<'a> {
    pub fn new(kv: &'a KvBackend) -> Self {
        Self { kv }
    }

    /// Acquire a namespace lock for `holder` with the given TTL. Returns
    /// `conflict` if another holder currently holds an unexpired lease on
    /// the same namespace.
    pub fn acquire(&self, namespace: &str, holder: &str, ttl_ms: DurationMs) -> CtxResult<LockLease> {
        let key = lock_key(namespace);
        if let Some(existing) = self.kv.get(&key).map_err(Into::<CtxError>::into)? {
            if let Ok(lease) = serde_json::from_slice::<LockLease>(&existing) {
                if lease.holder != holder {
                    return Err(CtxError::Conflict {
                        namespace: namespace.to_string(),
                    });
                }
            }
        }
        let lease = LockLease {
            token: LockId::now_v7(),
            namespace: namespace.to_string(),
            holder: holder.to_string(),
        };
        let payload = serde_json::to_vec(&lease).map_err(|e| {
            CtxError::Storage(StorageError::BackendUnavailable {
                backend: "kv".to_string(),
                reason: e.to_string(),
            })
        })?;
        self.kv
            .set(&key, &payload, ttl_ms)
            .map_err(Into::<CtxError>::into)?;
        Ok(lease)
    }

    /// Release a lease. Idempotent: releasing an already-expired or
    /// already-released lease is not an error. Refuses to release a lease
    /// it no longer owns by comparing tokens.
    pub fn release(&self, lease: &LockLease) -> CtxResult<()> {
        let key = lock_key(&lease.namespace);
        let Some(existing) = self.kv.get(&key).map_err(Into::<CtxError>::into)? else {
            return Ok(());
        };
        let Ok(current) = serde_json::from_slice::<LockLease>(&existing) else {
            return Ok(());
        };
        if current.token != lease.token {
            return Err(CtxError::Conflict {
                namespace: lease.namespace.clone(),
            });
        }
        self.kv.delete_key(&key).map_err(Into::<CtxError>::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_then_release_is_idempotent() {
        let dir = tempdir().unwrap();
        let kv = KvBackend::open(dir.path()).unwrap();
        let manager = LockManager::new(&kv);
        let lease = manager.acquire("/global/", "agent-1", 10_000).unwrap();
        manager.release(&lease).unwrap();
        manager.release(&lease).unwrap();
    }

    #[test]
    fn second_holder_is_rejected_while_lease_is_live() {
        let dir = tempdir().unwrap();
        let kv = KvBackend::open(dir.path()).unwrap();
        let manager = LockManager::new(&kv);
        let _lease = manager.acquire("/global/", "agent-1", 10_000).unwrap();
        let err = manager.acquire("/global/", "agent-2", 10_000).unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn expired_lease_allows_a_new_holder() {
        let dir = tempdir().unwrap();
        let kv = KvBackend::open(dir.path()).unwrap();
        let manager = LockManager::new(&kv);
        let _lease = manager.acquire("/global/", "agent-1", -1).unwrap();
        let lease = manager.acquire("/global/", "agent-2", 10_000).unwrap();
        assert_eq!(lease.holder, "agent-2");
    }

    #[test]
    fn release_with_stale_token_is_a_conflict() {
        let dir = tempdir().unwrap();
        let kv = KvBackend::open(dir.path()).unwrap();
        let manager = LockManager::new(&kv);
        let lease = manager.acquire("/global/", "agent-1", 10_000).unwrap();
        manager.release(&lease).unwrap();
        let _new_lease = manager.acquire("/global/", "agent-2", 10_000).unwrap();
        let err = manager.release(&lease).unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }
}
