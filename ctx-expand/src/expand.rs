//! Fact/Q&A expander. Scans a context's text for recognizable fact
//! shapes and generates question/answer pairs a paraphrased query can hit
//! directly, without re-deriving them from the parent context at query time.
//!
//! An ordered regex-pattern list: probes tried in order, first match wins,
//! falling back to nothing rather than guessing. Pure and idempotent by
//! construction: no randomness, no clock reads, so the same context text
//! always yields the same pairs.

use ctx_core::{Context, EntityIdType, QaPair, QaPairId};
use once_cell::sync::Lazy;
use regex::Regex;

/// Hard fanout cap per context: at most this many pairs are
/// generated, regardless of how many fact shapes match.
pub const QA_FANOUT_CAP: usize = 8;

/// Fact shapes the expander recognizes. Each maps to its own template and
/// confidence band; unrecognized text produces no pairs rather than a
/// low-confidence guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactType {
    Name,
    Email,
    Preference,
    Configuration,
    SprintGoal,
}

impl FactType {
    fn label(self) -> &'static str {
        match self {
            FactType::Name => "name",
            FactType::Email => "email",
            FactType::Preference => "preference",
            FactType::Configuration => "configuration",
            FactType::SprintGoal => "sprint goal",
        }
    }
}

struct FactPattern {
    fact_type: FactType,
    regex: &'static Lazy<Regex>,
    question: fn(&str) -> String,
    confidence: f32,
}

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bmy name is ([A-Z][\w.'-]*(?: [A-Z][\w.'-]*)?)").unwrap());
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,})\b").unwrap()
});
static PREFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bI (?:prefer|like|want) ([^\n.]{3,120})").unwrap()
});
static CONFIGURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([\w.-]+)\s*(?:=|:)\s*([\w./:-]{1,80})\b").unwrap()
});
static SPRINT_GOAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bsprint goal(?:\s+is)?\s*:?\s*([^\n.]{3,160})").unwrap()
});

fn name_question(_: &str) -> String {
    "What is the name mentioned here?".to_string()
}
fn email_question(_: &str) -> String {
    "What email address is mentioned here?".to_string()
}
fn preference_question(_: &str) -> String {
    "What preference was expressed here?".to_string()
}
fn configuration_question(_: &str) -> String {
    "What configuration value was set here?".to_string()
}
fn sprint_goal_question(_: &str) -> String {
    "What is the sprint goal?".to_string()
}

static PATTERNS: &[FactPattern] = &[
    FactPattern {
        fact_type: FactType::Name,
        regex: &NAME_RE,
        question: name_question,
        confidence: 0.9,
    },
    FactPattern {
        fact_type: FactType::Email,
        regex: &EMAIL_RE,
        question: email_question,
        confidence: 0.95,
    },
    FactPattern {
        fact_type: FactType::SprintGoal,
        regex: &SPRINT_GOAL_RE,
        question: sprint_goal_question,
        confidence: 0.85,
    },
    FactPattern {
        fact_type: FactType::Preference,
        regex: &PREFERENCE_RE,
        question: preference_question,
        confidence: 0.7,
    },
    FactPattern {
        fact_type: FactType::Configuration,
        regex: &CONFIGURATION_RE,
        question: configuration_question,
        confidence: 0.6,
    },
];

/// One generated pair before assignment of an id/timestamp, so callers can
/// inspect `fact_type`/`confidence` before deciding to persist.
#[derive(Debug, Clone)]
pub struct ExpandedFact {
    pub fact_type: FactType,
    pub question: String,
    pub answer: String,
    pub confidence: f32,
}

/// Scan `text` for every recognized fact shape, in pattern order, capped at
/// [`QA_FANOUT_CAP`] total matches across all fact types combined.
pub fn detect_facts(text: &str) -> Vec<ExpandedFact> {
    let mut facts = Vec::new();
    for pattern in PATTERNS {
        for captures in pattern.regex.captures_iter(text) {
            if facts.len() >= QA_FANOUT_CAP {
                return facts;
            }
            let answer = captures
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            if answer.is_empty() {
                continue;
            }
            facts.push(ExpandedFact {
                fact_type: pattern.fact_type,
                question: (pattern.question)(&answer),
                answer,
                confidence: pattern.confidence,
            });
        }
    }
    facts
}

/// Run the expander over a stored context's `text`/`title`/`description`
/// content fields and build [`QaPair`] values tagged with
/// `parent_context_id`. Returns an empty vector when nothing recognizable
/// is found; this is a normal outcome, not an error.
pub fn expand_context(context: &Context) -> Vec<QaPair> {
    let text = context_text(context);
    detect_facts(&text)
        .into_iter()
        .map(|fact| QaPair {
            id: QaPairId::now_v7(),
            parent_context_id: context.id,
            question: fact.question,
            answer: fact.answer,
            embedding: None,
            created_at: context.created_at,
        })
        .collect()
}

fn context_text(context: &Context) -> String {
    let mut parts = Vec::new();
    for key in ["text", "title", "description"] {
        if let Some(serde_json::Value::String(s)) = context.content.get(key) {
            parts.push(s.as_str());
        }
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctx_core::{AuthorType, ContextLifecycle, ContextType, compute_content_hash};
    use std::collections::BTreeMap;

    fn ctx_with_text(text: &str) -> Context {
        let mut content = BTreeMap::new();
        content.insert("text".to_string(), serde_json::Value::String(text.to_string()));
        Context {
            id: ctx_core::ContextId::now_v7(),
            context_type: ContextType::Log,
            content,
            metadata: BTreeMap::new(),
            author: "agent-1".to_string(),
            author_type: AuthorType::Agent,
            created_at: chrono::Utc::now(),
            namespace: "/global/".to_string(),
            embedding: None,
            vector_id: None,
            graph_id: None,
            deleted_at: None,
            purge_at: None,
            lifecycle: ContextLifecycle::Draft,
            content_hash: compute_content_hash(text.as_bytes()),
        }
    }

    #[test]
    fn detects_a_name_and_an_email() {
        let facts = detect_facts("My name is Priya Shah. Reach me at priya@example.com.");
        assert!(facts.iter().any(|f| f.fact_type == FactType::Name && f.answer == "Priya Shah"));
        assert!(facts
            .iter()
            .any(|f| f.fact_type == FactType::Email && f.answer == "priya@example.com"));
    }

    #[test]
    fn fanout_is_capped_at_eight_pairs() {
        let mut text = String::new();
        for i in 0..20 {
            text.push_str(&format!("key{i} = value{i}\n"));
        }
        let facts = detect_facts(&text);
        assert_eq!(facts.len(), QA_FANOUT_CAP);
    }

    #[test]
    fn unrecognized_text_produces_no_facts() {
        assert!(detect_facts("just a plain sentence with no structure").is_empty());
    }

    #[test]
    fn expansion_is_pure_and_idempotent() {
        let ctx = ctx_with_text("sprint goal: ship the ranking rewrite");
        let a = expand_context(&ctx);
        let b = expand_context(&ctx);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.question, y.question);
            assert_eq!(x.answer, y.answer);
        }
    }

    #[test]
    fn every_pair_is_tagged_with_its_parent_context_id() {
        let ctx = ctx_with_text("my name is Oren");
        let pairs = expand_context(&ctx);
        assert!(!pairs.is_empty());
        for pair in &pairs {
            assert_eq!(pair.parent_context_id, ctx.id);
        }
    }

    #[test]
    fn confidence_scores_are_within_unit_interval() {
        for pattern in PATTERNS {
            assert!(pattern.confidence > 0.0 && pattern.confidence <= 1.0);
        }
    }
}
