//! Intent classification, query rewriting, and scoring.
//!
//! Candidates get a combined score over four weighted components, then
//! per-result adjustments, and every ranked result carries its own
//! [`Explanation`]. The lightweight regex+keyword classifier follows the
//! same `&'static [Pattern]` table idiom as `ctx-expand::expand`'s fact
//! patterns.

use chrono::{DateTime, Utc};
use ctx_core::{ContextType, RankingPolicyConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Coarse intent behind a query, used to pick rewrite templates and to gate
/// the technical-boost score adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Configuration,
    Troubleshooting,
    Howto,
    Conceptual,
    Lookup,
    Unknown,
}

impl Intent {
    /// Configuration/troubleshooting queries get the technical-boost
    /// adjustment; the others don't.
    fn is_technical(self) -> bool {
        matches!(self, Intent::Configuration | Intent::Troubleshooting)
    }
}

static CONFIGURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(config|configure|setting|env var|environment variable|flag)\b").unwrap());
static TROUBLESHOOTING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(error|bug|fail(?:ing|ed|ure)?|broken|crash|exception|stack trace)\b").unwrap());
static HOWTO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*how (do|to|can)\b").unwrap());
static CONCEPTUAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(why|what is|what are|explain)\b").unwrap());
static LOOKUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*(who|when|where)\b").unwrap());

fn patterns() -> [(Intent, &'static Lazy<Regex>, f32); 5] {
    [
        (Intent::Troubleshooting, &TROUBLESHOOTING_RE, 0.85),
        (Intent::Configuration, &CONFIGURATION_RE, 0.8),
        (Intent::Howto, &HOWTO_RE, 0.9),
        (Intent::Lookup, &LOOKUP_RE, 0.75),
        (Intent::Conceptual, &CONCEPTUAL_RE, 0.7),
    ]
}

/// An entity pulled out of the query text by whichever pattern matched;
/// currently just the literal matched span, good enough to drive rewrite
/// templates without a full NER pass.
pub type Entity = String;

/// Classify a query's intent. Confidence is the fixed weight of whichever
/// pattern matched first in priority order; `Unknown` carries confidence 0.
pub fn classify_intent(query: &str) -> (Intent, f32, Vec<Entity>) {
    for (intent, regex, confidence) in patterns() {
        if let Some(m) = regex.find(query) {
            return (intent, confidence, vec![m.as_str().to_string()]);
        }
    }
    (Intent::Unknown, 0.0, Vec::new())
}

/// Minimum intent confidence before rewrites are generated at all.
const REWRITE_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Produce up to `max_rewrites` alternate phrasings of `query`, plus the
/// original as element zero. Returns just `[query]` when intent confidence
/// is below threshold or no template applies.
pub fn rewrite_query(query: &str, intent: Intent, confidence: f32, max_rewrites: usize) -> Vec<String> {
    let mut variants = vec![query.to_string()];
    if confidence < REWRITE_CONFIDENCE_THRESHOLD {
        return variants;
    }
    let trimmed = query.trim().trim_end_matches('?').trim();
    let templated = match intent {
        Intent::Howto => vec![format!("{trimmed} instructions"), format!("steps to {trimmed}")],
        Intent::Troubleshooting => vec![format!("fix {trimmed}"), format!("{trimmed} root cause")],
        Intent::Configuration => vec![format!("{trimmed} settings"), format!("{trimmed} default value")],
        Intent::Conceptual => vec![format!("{trimmed} overview"), format!("definition of {trimmed}")],
        Intent::Lookup | Intent::Unknown => Vec::new(),
    };
    for variant in normalize(query).into_iter().chain(templated) {
        if variants.len() >= max_rewrites + 1 {
            break;
        }
        if !variants.contains(&variant) {
            variants.push(variant);
        }
    }
    variants.truncate(max_rewrites + 1);
    variants
}

/// Contraction expansion and question/statement normalization.
fn normalize(query: &str) -> Vec<String> {
    let mut out = Vec::new();
    let expanded = query
        .replace("don't", "do not")
        .replace("can't", "cannot")
        .replace("won't", "will not")
        .replace("what's", "what is")
        .replace("it's", "it is");
    if expanded != query {
        out.push(expanded);
    }
    let as_statement = query.trim_end_matches('?').to_string();
    if as_statement != query && !as_statement.trim().is_empty() {
        out.push(as_statement);
    }
    out
}

/// Raw, pre-weighted score components for one candidate, assembled by the
/// dispatcher from each backend's native score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreComponents {
    /// Cosine similarity against the query embedding, max over all rewrite
    /// variants that were dispatched.
    pub dense: f32,
    /// BM25 score from the text backend, normalized to roughly `[0, 1]` by
    /// the caller (the raw BM25 scale is unbounded).
    pub lexical: f32,
    /// `1 / (hops + 0.5)` from the graph backend, 0 when unreached.
    pub graph: f32,
    /// Declarative/interrogative and type-weighted prior in roughly `[0, 2]`.
    pub fact_prior: f32,
}

/// Per-candidate adjustment metadata needed to compute the post-scoring
/// boosts, kept separate from `ScoreComponents` since these aren't summed
/// the same way (multiplicative, not weighted-additive).
#[derive(Debug, Clone, Copy)]
pub struct ScoreAdjustments {
    pub exact_match: bool,
    pub age_days: f32,
    pub context_type: Option<ContextType>,
}

/// Graph hop distance decayed into a score: `1 / (hops + 0.5)`.
pub fn graph_hop_score(hops: Option<usize>) -> f32 {
    match hops {
        Some(h) => 1.0 / (h as f32 + 0.5),
        None => 0.0,
    }
}

/// Declarative statements get a small boost, interrogative ones a small
/// penalty; `type_boosts` then multiplies by the context's own type weight
/// (e.g. design boosted over log for technical intents).
pub fn fact_prior(text: &str, context_type: Option<ContextType>, policy: &RankingPolicyConfig, intent: Intent) -> f32 {
    let mut prior = if text.trim_end().ends_with('?') { 0.8 } else { 1.1 };
    if intent.is_technical() {
        if let Some(ty) = context_type {
            if let Some(boost) = policy.type_boosts.get(&ty.to_string()) {
                prior *= boost;
            }
        }
    }
    prior
}

/// Combine weighted components and apply the exact-match, recency-decay,
/// and technical-boost adjustments, returning the final score plus an
/// explanation breakdown.
#[derive(Debug, Clone)]
pub struct Explanation {
    pub original_score: f32,
    pub boosts: BTreeMap<String, f32>,
    pub final_score: f32,
}

pub fn score(
    components: ScoreComponents,
    adjustments: ScoreAdjustments,
    policy: &RankingPolicyConfig,
    intent: Intent,
) -> Explanation {
    let w = policy.weights;
    let original_score = w.dense * components.dense
        + w.lexical * components.lexical
        + w.graph * components.graph
        + w.fact_prior * components.fact_prior;

    let mut boosts = BTreeMap::new();
    let mut final_score = original_score;

    if adjustments.exact_match {
        boosts.insert("exact_match".to_string(), policy.exact_match_multiplier);
        final_score *= policy.exact_match_multiplier;
    }

    let tau_days = (policy.recency_tau_ms as f32 / 86_400_000.0).max(f32::EPSILON);
    let recency = (-adjustments.age_days / tau_days).exp().max(0.1);
    boosts.insert("recency".to_string(), recency);
    final_score *= recency;

    if intent.is_technical() {
        boosts.insert("technical".to_string(), policy.technical_boost_multiplier);
        final_score *= policy.technical_boost_multiplier;
    }

    Explanation { original_score, boosts, final_score }
}

/// Age in whole-and-fractional days between `created_at` and `now`, floored
/// at zero so a clock skew never produces a negative decay exponent.
pub fn age_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    (now - created_at).num_milliseconds().max(0) as f32 / 86_400_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn troubleshooting_keywords_classify_as_troubleshooting() {
        let (intent, confidence, _) = classify_intent("why is the deploy failing with a stack trace");
        assert_eq!(intent, Intent::Troubleshooting);
        assert!(confidence > 0.5);
    }

    #[test]
    fn unrecognized_query_is_unknown_with_zero_confidence() {
        let (intent, confidence, entities) = classify_intent("xyzzy plugh");
        assert_eq!(intent, Intent::Unknown);
        assert_eq!(confidence, 0.0);
        assert!(entities.is_empty());
    }

    #[test]
    fn rewrites_are_capped_and_include_the_original() {
        let variants = rewrite_query("how do I configure the rate limiter?", Intent::Howto, 0.9, 3);
        assert_eq!(variants[0], "how do I configure the rate limiter?");
        assert!(variants.len() <= 4);
        assert!(variants.len() > 1);
    }

    #[test]
    fn low_confidence_intent_produces_no_rewrites() {
        let variants = rewrite_query("some ambient query", Intent::Unknown, 0.0, 3);
        assert_eq!(variants, vec!["some ambient query".to_string()]);
    }

    #[test]
    fn graph_hop_score_decays_with_distance() {
        let near = graph_hop_score(Some(0));
        let far = graph_hop_score(Some(3));
        assert!(near > far);
        assert_eq!(graph_hop_score(None), 0.0);
    }

    #[test]
    fn exact_match_and_recency_multiply_the_base_score() {
        let policy = RankingPolicyConfig::default();
        let components = ScoreComponents { dense: 0.8, lexical: 0.2, graph: 0.0, fact_prior: 1.0 };
        let fresh = score(
            components,
            ScoreAdjustments { exact_match: true, age_days: 0.0, context_type: None },
            &policy,
            Intent::Lookup,
        );
        let stale = score(
            components,
            ScoreAdjustments { exact_match: false, age_days: 365.0, context_type: None },
            &policy,
            Intent::Lookup,
        );
        assert!(fresh.final_score > stale.final_score);
        assert!(fresh.boosts.contains_key("exact_match"));
    }

    #[test]
    fn recency_decay_never_drops_below_the_floor() {
        let policy = RankingPolicyConfig::default();
        let components = ScoreComponents { dense: 1.0, lexical: 0.0, graph: 0.0, fact_prior: 1.0 };
        let ancient = score(
            components,
            ScoreAdjustments { exact_match: false, age_days: 100_000.0, context_type: None },
            &policy,
            Intent::Lookup,
        );
        assert!(*ancient.boosts.get("recency").unwrap() >= 0.1);
    }

    #[test]
    fn technical_boost_only_applies_to_technical_intents() {
        let policy = RankingPolicyConfig::default();
        let components = ScoreComponents { dense: 0.5, lexical: 0.5, graph: 0.0, fact_prior: 1.0 };
        let adj = ScoreAdjustments { exact_match: false, age_days: 0.0, context_type: None };
        let technical = score(components, adj, &policy, Intent::Troubleshooting);
        let conceptual = score(components, adj, &policy, Intent::Conceptual);
        assert!(technical.boosts.contains_key("technical"));
        assert!(!conceptual.boosts.contains_key("technical"));
    }
}
