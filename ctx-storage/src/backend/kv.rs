//! LMDB-backed key-value backend for scratchpads, locks, leases, and event
//! streams. Every `set` requires a TTL.
//!
//! Backed by `heed` (memory-mapped LMDB bindings): one `Env`, one named
//! `Database` of raw bytes, a write transaction per mutation. Key families
//! are plain UTF-8 strings: `scratch:{agent}:{key}`, `lock:{namespace}`,
//! `events:{stream}`, `lease:{...}`.

use super::{BackendAdapter, SearchHit, SearchQuery, StoreItem};
use async_trait::async_trait;
use ctx_core::{ContextId, CtxResult, DurationMs, HealthCheck, StorageError};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

/// Error type for LMDB-backed KV operations.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("failed to open LMDB environment: {0}")]
    EnvOpen(String),
    #[error("failed to open database: {0}")]
    DbOpen(String),
    #[error("transaction error: {0}")]
    Transaction(String),
}

impl From<KvError> for ctx_core::CtxError {
    fn from(e: KvError) -> Self {
        ctx_core::CtxError::Storage(StorageError::BackendUnavailable {
            backend: "kv".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Every write carries a mandatory TTL; callers that want a key to outlive
/// the named classes must use [`TtlPolicy::Persistent`] explicitly rather
/// than omitting a TTL.
pub struct KvBackend {
    env: Env,
    db: Database<Str, Bytes>,
    expiry: RwLock<std::collections::HashMap<String, i64>>,
}

impl KvBackend {
    pub fn open(path: &Path) -> Result<Self, KvError> {
        std::fs::create_dir_all(path).map_err(|e| KvError::EnvOpen(e.to_string()))?;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(256 * 1024 * 1024)
                .max_dbs(1)
                .open(path)
                .map_err(|e| KvError::EnvOpen(e.to_string()))?
        };
        let mut wtxn = env.write_txn().map_err(|e| KvError::Transaction(e.to_string()))?;
        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, Some("ctx_kv"))
            .map_err(|e| KvError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(|e| KvError::Transaction(e.to_string()))?;
        Ok(Self {
            env,
            db,
            expiry: RwLock::new(std::collections::HashMap::new()),
        })
    }

    /// Set a key with a mandatory TTL in milliseconds.
    pub fn set(&self, key: &str, value: &[u8], ttl_ms: DurationMs) -> Result<(), KvError> {
        let mut wtxn = self.env.write_txn().map_err(|e| KvError::Transaction(e.to_string()))?;
        self.db
            .put(&mut wtxn, key, value)
            .map_err(|e| KvError::Transaction(e.to_string()))?;
        wtxn.commit().map_err(|e| KvError::Transaction(e.to_string()))?;
        let expires_at_ms = now_ms() + ttl_ms;
        self.expiry.write().unwrap().insert(key.to_string(), expires_at_ms);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        if self.is_expired(key) {
            return Ok(None);
        }
        let rtxn = self.env.read_txn().map_err(|e| KvError::Transaction(e.to_string()))?;
        Ok(self
            .db
            .get(&rtxn, key)
            .map_err(|e| KvError::Transaction(e.to_string()))?
            .map(|v| v.to_vec()))
    }

    pub fn delete_key(&self, key: &str) -> Result<(), KvError> {
        let mut wtxn = self.env.write_txn().map_err(|e| KvError::Transaction(e.to_string()))?;
        self.db
            .delete(&mut wtxn, key)
            .map_err(|e| KvError::Transaction(e.to_string()))?;
        wtxn.commit().map_err(|e| KvError::Transaction(e.to_string()))?;
        self.expiry.write().unwrap().remove(key);
        Ok(())
    }

    /// List non-expired keys under `prefix`, for `get_agent_state`'s
    /// key-enumeration path when no single key is requested.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let rtxn = self.env.read_txn().map_err(|e| KvError::Transaction(e.to_string()))?;
        let mut keys = Vec::new();
        for entry in self.db.iter(&rtxn).map_err(|e| KvError::Transaction(e.to_string()))? {
            let (key, _) = entry.map_err(|e| KvError::Transaction(e.to_string()))?;
            if key.starts_with(prefix) && !self.is_expired(key) {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }

    fn is_expired(&self, key: &str) -> bool {
        self.expiry
            .read()
            .unwrap()
            .get(key)
            .map(|exp| *exp <= now_ms())
            .unwrap_or(false)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Key for an agent's keyed scratchpad entry, under the key family
/// `scratch:{agent}:{key}`. Exported so `ctx-api`'s `update_scratchpad`/
/// `get_agent_state` tools address the same keys this backend's own
/// `StoreItem` write path does.
pub fn scratch_key(agent: &str, key: &str) -> String {
    format!("scratch:{agent}:{key}")
}

pub fn lock_key(namespace: &str) -> String {
    format!("lock:{namespace}")
}

#[async_trait]
impl BackendAdapter for KvBackend {
    fn name(&self) -> &'static str {
        "kv"
    }

    async fn store(&self, item: &StoreItem, _deadline: Duration) -> CtxResult<()> {
        let key = scratch_key(&item.namespace, &item.id.to_string());
        self.set(&key, item.text.as_bytes(), 24 * 3_600_000)
            .map_err(Into::into)
    }

    async fn search(&self, _query: &SearchQuery, _deadline: Duration) -> CtxResult<Vec<SearchHit>> {
        // The KV backend is surfaced only by exact key lookup; it
        // never participates in the fan-out query dispatcher.
        Ok(Vec::new())
    }

    async fn delete(&self, id: ContextId, _deadline: Duration) -> CtxResult<()> {
        let key = scratch_key("*", &id.to_string());
        self.delete_key(&key).map_err(Into::into)
    }

    async fn health(&self) -> HealthCheck {
        match self.env.read_txn() {
            Ok(_) => HealthCheck::healthy("kv"),
            Err(e) => HealthCheck::unhealthy("kv", e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn set_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let kv = KvBackend::open(dir.path()).unwrap();
        kv.set("scratch:agent-1:progress", b"halfway", 60_000).unwrap();
        assert_eq!(kv.get("scratch:agent-1:progress").unwrap(), Some(b"halfway".to_vec()));
    }

    #[test]
    fn expired_key_reads_as_absent() {
        let dir = tempdir().unwrap();
        let kv = KvBackend::open(dir.path()).unwrap();
        kv.set("scratch:agent-1:progress", b"x", -1).unwrap();
        assert_eq!(kv.get("scratch:agent-1:progress").unwrap(), None);
    }

    #[test]
    fn delete_removes_value() {
        let dir = tempdir().unwrap();
        let kv = KvBackend::open(dir.path()).unwrap();
        kv.set("lock:/global/", b"holder", 1_000).unwrap();
        kv.delete_key("lock:/global/").unwrap();
        assert_eq!(kv.get("lock:/global/").unwrap(), None);
    }
}
