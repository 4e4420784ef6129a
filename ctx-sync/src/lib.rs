//! TTL enforcement, the event log, and the periodic sync worker, plus
//! the lock orchestration layer: retry/backoff and default lease duration
//! atop `ctx-storage::LockManager`'s bare acquire/release mechanism.
//!
//! The event log is deliberately narrow: a flat, bounded, append-only,
//! watermark-queryable ring buffer of storage operation records per
//! stream, with no payload genericity and no signaling channel.

pub mod event_log;
pub mod lock_coordinator;
pub mod ttl;
pub mod worker;

pub use event_log::{EventLog, EventOutcome, StorageEvent, Watermark, STREAM_CAPACITY};
pub use lock_coordinator::{LockCoordinator, RetryPolicy, DEFAULT_LEASE_MS};
pub use ttl::{MissingTtlBehavior, TtlGate};
pub use worker::{FixedJitter, JitterSource, RandomJitter, SyncStats, SyncWorker};
