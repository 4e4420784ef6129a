//! Bounded, per-stream event log. Every storage-affecting
//! operation is appended here before the sync worker later drains it into
//! the graph as `Event` nodes.
//!
//! A [`Watermark`] is a monotonically increasing sequence number, a
//! comparable point in a stream's history; each stream is an independent,
//! bounded ring buffer of a single event shape.

use chrono::{DateTime, Utc};
use ctx_core::ContextId;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// Ring-buffer cap per stream; the oldest entries rotate out beyond this.
pub const STREAM_CAPACITY: usize = 10_000;

/// A point in a stream's append history. Comparable across calls to
/// `drain_since`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    pub sequence: u64,
}

impl Watermark {
    pub const fn zero() -> Self {
        Self { sequence: 0 }
    }
}

/// Outcome of a storage-affecting operation, recorded for audit/replay.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Success,
    Failure { reason: String },
}

/// One entry in the event log.
#[derive(Debug, Clone)]
pub struct StorageEvent {
    pub sequence: u64,
    pub op: String,
    pub context_id: Option<ContextId>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub namespace: String,
    pub outcome: EventOutcome,
}

#[derive(Default)]
struct Stream {
    /// Sequence of the most recently appended entry; the first entry in a
    /// stream gets sequence 1 so `Watermark::zero()` sits strictly before
    /// every event.
    last_sequence: u64,
    entries: VecDeque<StorageEvent>,
}

/// Bounded multi-stream append log. One stream per logical source (e.g. one
/// per namespace, or a single `"default"` stream); each rotates
/// independently once it exceeds [`STREAM_CAPACITY`].
#[derive(Default)]
pub struct EventLog {
    streams: RwLock<HashMap<String, Stream>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to `stream`, rotating out the oldest entry if the
    /// stream is at capacity. Returns the watermark of the appended event.
    pub fn append(
        &self,
        stream: &str,
        op: impl Into<String>,
        context_id: Option<ContextId>,
        actor: impl Into<String>,
        namespace: impl Into<String>,
        outcome: EventOutcome,
    ) -> Watermark {
        let mut streams = self.streams.write().unwrap();
        let entry = streams.entry(stream.to_string()).or_default();
        let sequence = entry.last_sequence + 1;
        entry.last_sequence = sequence;
        entry.entries.push_back(StorageEvent {
            sequence,
            op: op.into(),
            context_id,
            actor: actor.into(),
            timestamp: Utc::now(),
            namespace: namespace.into(),
            outcome,
        });
        while entry.entries.len() > STREAM_CAPACITY {
            entry.entries.pop_front();
        }
        Watermark { sequence }
    }

    /// All events in `stream` strictly after `watermark`, oldest first.
    /// Entries rotated out before being drained are gone; callers that
    /// need exactly-once delivery must drain more often than the rotation
    /// period.
    pub fn drain_since(&self, stream: &str, watermark: Watermark) -> Vec<StorageEvent> {
        let streams = self.streams.read().unwrap();
        streams
            .get(stream)
            .map(|s| {
                s.entries
                    .iter()
                    .filter(|e| e.sequence > watermark.sequence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Current watermark for `stream` (the sequence of the most recently
    /// appended entry, or zero if the stream has never been written to).
    pub fn current_watermark(&self, stream: &str) -> Watermark {
        let streams = self.streams.read().unwrap();
        streams
            .get(stream)
            .and_then(|s| s.entries.back())
            .map(|e| Watermark { sequence: e.sequence })
            .unwrap_or(Watermark::zero())
    }

    /// Remove entries older than `before`, returning the count removed.
    /// Used by the sync worker's retention sweep.
    pub fn prune_older_than(&self, stream: &str, before: DateTime<Utc>) -> usize {
        let mut streams = self.streams.write().unwrap();
        let Some(entry) = streams.get_mut(stream) else { return 0 };
        let before_len = entry.entries.len();
        entry.entries.retain(|e| e.timestamp >= before);
        before_len - entry.entries.len()
    }
}
