//! Fact/Q&A expansion and relationship detection.
//!
//! Both passes run over a context's content and return typed results plus
//! per-item counts rather than erroring the caller's larger operation:
//! expansion and detection never fail a context write. Both are re-run by
//! the store orchestrator on every write, so neither keeps state of its
//! own.

pub mod expand;
pub mod relate;

pub use expand::{expand_context, FactType, QA_FANOUT_CAP};
pub use relate::{detect_relationships, ContextLookup, ContextRef, DetectionStats};
