//! Configuration types
//!
//! All fields are required and `validate()` checks cross-field invariants.
//! There is no silent runtime mutation; a config reload requires a process
//! restart.

use crate::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `embedding:{…}` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EmbeddingConfigSection {
    pub model: String,
    pub dimensions: i32,
}

/// A single backend endpoint/credential pair within `storage:{…}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BackendEndpoint {
    pub endpoint: String,
    pub credential: Option<String>,
}

/// `storage:{vector, graph, kv}` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StorageConfigSection {
    pub vector: BackendEndpoint,
    pub graph: BackendEndpoint,
    pub kv: BackendEndpoint,
}

/// `ttl:{scratchpad, session, cache, temporary, persistent}` config section.
///
/// `persistent` has no duration; it is documented here for completeness but
/// `TtlPolicy::Persistent` never consults it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TtlConfig {
    pub scratchpad_ms: DurationMs,
    pub session_ms: DurationMs,
    pub cache_ms: DurationMs,
    pub temporary_ms: DurationMs,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            scratchpad_ms: 3_600_000,
            session_ms: 7 * 24 * 3_600_000,
            cache_ms: 5 * 60_000,
            temporary_ms: 60_000,
        }
    }
}

/// `dispatch:{per_backend_deadlines_ms, default_policy}` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DispatchConfigSection {
    pub per_backend_deadlines_ms: HashMap<String, i64>,
    pub default_policy: DispatchPolicy,
    /// Cap on concurrent in-flight calls per backend.
    pub max_inflight_per_backend: usize,
}

impl Default for DispatchConfigSection {
    fn default() -> Self {
        let mut deadlines = HashMap::new();
        deadlines.insert("kv".to_string(), 3);
        deadlines.insert("text".to_string(), 20);
        deadlines.insert("vector".to_string(), 100);
        deadlines.insert("graph".to_string(), 200);
        Self {
            per_backend_deadlines_ms: deadlines,
            default_policy: DispatchPolicy::Parallel,
            max_inflight_per_backend: 32,
        }
    }
}

/// Weight vector `(α, β, γ, δ)` combining a candidate's dense, lexical,
/// graph-distance, and fact-prior score components into one number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ScoreWeights {
    pub dense: f32,
    pub lexical: f32,
    pub graph: f32,
    pub fact_prior: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { dense: 0.5, lexical: 0.25, graph: 0.15, fact_prior: 0.1 }
    }
}

/// A single named ranking policy within `ranking:{policies:[…]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RankingPolicyConfig {
    pub name: String,
    pub weights: ScoreWeights,
    pub type_boosts: HashMap<String, f32>,
    /// `τ` in the recency decay `exp(-age_days / τ)`, in milliseconds.
    pub recency_tau_ms: DurationMs,
    pub exact_match_multiplier: f32,
    pub technical_boost_multiplier: f32,
    pub max_rewrites: usize,
}

impl Default for RankingPolicyConfig {
    fn default() -> Self {
        let mut type_boosts = HashMap::new();
        type_boosts.insert("design".to_string(), 1.2);
        type_boosts.insert("log".to_string(), 0.9);
        Self {
            name: "default".to_string(),
            weights: ScoreWeights::default(),
            type_boosts,
            recency_tau_ms: 30 * 24 * 3_600_000,
            exact_match_multiplier: 1.5,
            technical_boost_multiplier: 1.2,
            max_rewrites: 3,
        }
    }
}

/// `ranking:{policies:[…]}` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RankingConfigSection {
    pub policies: Vec<RankingPolicyConfig>,
    pub default_policy: String,
}

impl Default for RankingConfigSection {
    fn default() -> Self {
        Self {
            policies: vec![RankingPolicyConfig::default()],
            default_policy: "default".to_string(),
        }
    }
}

/// One configured API key: the opaque secret plus the principal it resolves
/// to. The key itself is plain `String` here, since config is inert data; the
/// `secrecy`-wrapping happens where `ctx-auth` loads this into its runtime
/// key store, keeping the on-disk representation plain and the runtime
/// representation guarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiKeyEntry {
    pub key: String,
    pub principal_id: String,
    pub role: Role,
    pub is_agent: bool,
}

/// `auth:{…}` config section: the full set of valid keys, loaded once at
/// startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AuthConfigSection {
    pub api_keys: Vec<ApiKeyEntry>,
}

impl Default for AuthConfigSection {
    fn default() -> Self {
        Self { api_keys: Vec::new() }
    }
}

/// Master configuration struct loaded from the candidate-path chain:
/// env `CTX_CONFIG_PATH` → `./config/.ctxrc.yaml` → `./.ctxrc.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CtxConfig {
    pub embedding: EmbeddingConfigSection,
    pub storage: StorageConfigSection,
    pub ttl: TtlConfig,
    pub dispatch: DispatchConfigSection,
    pub ranking: RankingConfigSection,
    pub auth: AuthConfigSection,
    /// `AUTH_REQUIRED` env var, default true in prod.
    pub auth_required: bool,
    /// `STRICT_EMBEDDINGS` env var; if true, a failed embedding self-test is
    /// a startup-fatal condition (process exit code 3).
    pub strict_embeddings: bool,
}

impl CtxConfig {
    /// Validate invariants that `serde` alone cannot express.
    pub fn validate(&self) -> CtxResult<()> {
        if self.embedding.dimensions <= 0 {
            return Err(CtxError::Config(ConfigError::InvalidValue {
                field: "embedding.dimensions".to_string(),
                value: self.embedding.dimensions.to_string(),
                reason: "dimensions must be greater than 0".to_string(),
            }));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(CtxError::Config(ConfigError::MissingRequired {
                field: "embedding.model".to_string(),
            }));
        }
        for (name, ms) in [
            ("ttl.scratchpad_ms", self.ttl.scratchpad_ms),
            ("ttl.session_ms", self.ttl.session_ms),
            ("ttl.cache_ms", self.ttl.cache_ms),
            ("ttl.temporary_ms", self.ttl.temporary_ms),
        ] {
            if ms <= 0 {
                return Err(CtxError::Config(ConfigError::InvalidValue {
                    field: name.to_string(),
                    value: ms.to_string(),
                    reason: "TTL durations must be positive".to_string(),
                }));
            }
        }
        if self.dispatch.max_inflight_per_backend == 0 {
            return Err(CtxError::Config(ConfigError::InvalidValue {
                field: "dispatch.max_inflight_per_backend".to_string(),
                value: "0".to_string(),
                reason: "must allow at least one in-flight call".to_string(),
            }));
        }
        if !self
            .ranking
            .policies
            .iter()
            .any(|p| p.name == self.ranking.default_policy)
        {
            return Err(CtxError::Config(ConfigError::InvalidValue {
                field: "ranking.default_policy".to_string(),
                value: self.ranking.default_policy.clone(),
                reason: "must name one of ranking.policies".to_string(),
            }));
        }
        {
            let mut seen = std::collections::HashSet::new();
            for entry in &self.auth.api_keys {
                if entry.key.trim().is_empty() {
                    return Err(CtxError::Config(ConfigError::InvalidValue {
                        field: "auth.api_keys[].key".to_string(),
                        value: String::new(),
                        reason: "api key must not be empty".to_string(),
                    }));
                }
                if !seen.insert(entry.key.clone()) {
                    return Err(CtxError::Config(ConfigError::InvalidValue {
                        field: "auth.api_keys[].key".to_string(),
                        value: entry.key.clone(),
                        reason: "duplicate api key".to_string(),
                    }));
                }
            }
        }
        Ok(())
    }

    /// A self-consistent default configuration, used when no config file is
    /// found on any candidate path (treated distinctly from a malformed
    /// file, which is instead skipped to the next candidate).
    pub fn default_for_tests() -> Self {
        Self {
            embedding: EmbeddingConfigSection {
                model: "hash-embed-v1".to_string(),
                dimensions: 256,
            },
            storage: StorageConfigSection {
                vector: BackendEndpoint {
                    endpoint: "memory://vector".to_string(),
                    credential: None,
                },
                graph: BackendEndpoint {
                    endpoint: "memory://graph".to_string(),
                    credential: None,
                },
                kv: BackendEndpoint {
                    endpoint: "memory://kv".to_string(),
                    credential: None,
                },
            },
            ttl: TtlConfig::default(),
            dispatch: DispatchConfigSection::default(),
            ranking: RankingConfigSection::default(),
            auth: AuthConfigSection {
                api_keys: vec![
                    ApiKeyEntry {
                        key: "test-admin-key".to_string(),
                        principal_id: "admin-1".to_string(),
                        role: Role::Admin,
                        is_agent: false,
                    },
                    ApiKeyEntry {
                        key: "test-writer-key".to_string(),
                        principal_id: "agent-1".to_string(),
                        role: Role::Writer,
                        is_agent: true,
                    },
                    ApiKeyEntry {
                        key: "test-reader-key".to_string(),
                        principal_id: "reader-1".to_string(),
                        role: Role::Reader,
                        is_agent: false,
                    },
                ],
            },
            auth_required: true,
            strict_embeddings: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        CtxConfig::default_for_tests().validate().unwrap();
    }

    #[test]
    fn zero_dimensions_is_rejected() {
        let mut cfg = CtxConfig::default_for_tests();
        cfg.embedding.dimensions = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_policy_must_be_declared() {
        let mut cfg = CtxConfig::default_for_tests();
        cfg.ranking.default_policy = "nonexistent".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn duplicate_api_keys_are_rejected() {
        let mut cfg = CtxConfig::default_for_tests();
        let dup = cfg.auth.api_keys[0].clone();
        cfg.auth.api_keys.push(dup);
        assert!(cfg.validate().is_err());
    }
}
