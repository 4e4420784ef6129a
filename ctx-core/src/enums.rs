//! Enum types for the context memory domain

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CONTEXT TYPE
// ============================================================================

/// Closed set of context types. Unknown types are rejected at
/// validation, not silently accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Design,
    Decision,
    Trace,
    Sprint,
    Log,
    /// Accepted for compatibility with existing call sites; carries no
    /// ranking boost.
    Test,
}

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            ContextType::Design => "design",
            ContextType::Decision => "decision",
            ContextType::Trace => "trace",
            ContextType::Sprint => "sprint",
            ContextType::Log => "log",
            ContextType::Test => "test",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for ContextType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "design" => Ok(ContextType::Design),
            "decision" => Ok(ContextType::Decision),
            "trace" => Ok(ContextType::Trace),
            "sprint" => Ok(ContextType::Sprint),
            "log" => Ok(ContextType::Log),
            "test" => Ok(ContextType::Test),
            _ => Err(format!("unknown context type: {}", s)),
        }
    }
}

// ============================================================================
// AUTHORSHIP
// ============================================================================

/// Whether a context/scratchpad entry was authored by a human or an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum AuthorType {
    Human,
    Agent,
}

impl fmt::Display for AuthorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if matches!(self, AuthorType::Human) { "human" } else { "agent" })
    }
}

impl FromStr for AuthorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "human" => Ok(AuthorType::Human),
            "agent" => Ok(AuthorType::Agent),
            _ => Err(format!("unknown author type: {}", s)),
        }
    }
}

// ============================================================================
// ROLES
// ============================================================================

/// A principal's role, in ascending order of capability: `reader < writer
/// < admin`, with `guest` outside that chain on its own narrow allowance. Ordered so config files can compare roles lexically
/// if they ever need to, though the capability matrix lives on [`Role::can`]
/// in `ctx-auth`, not here; this enum is the config-loadable fact, not the
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    Reader,
    Writer,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Guest => "guest",
            Role::Reader => "reader",
            Role::Writer => "writer",
            Role::Admin => "admin",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "guest" => Ok(Role::Guest),
            "reader" => Ok(Role::Reader),
            "writer" => Ok(Role::Writer),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

// ============================================================================
// RELATIONSHIP EDGES
// ============================================================================

/// Fixed set of relationship edge kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum RelationshipType {
    RelatesTo,
    DependsOn,
    PrecededBy,
    FollowedBy,
    PartOf,
    Implements,
    Fixes,
    References,
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            RelationshipType::RelatesTo => "RELATES_TO",
            RelationshipType::DependsOn => "DEPENDS_ON",
            RelationshipType::PrecededBy => "PRECEDED_BY",
            RelationshipType::FollowedBy => "FOLLOWED_BY",
            RelationshipType::PartOf => "PART_OF",
            RelationshipType::Implements => "IMPLEMENTS",
            RelationshipType::Fixes => "FIXES",
            RelationshipType::References => "REFERENCES",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "relatesto" => Ok(RelationshipType::RelatesTo),
            "dependson" => Ok(RelationshipType::DependsOn),
            "precededby" => Ok(RelationshipType::PrecededBy),
            "followedby" => Ok(RelationshipType::FollowedBy),
            "partof" => Ok(RelationshipType::PartOf),
            "implements" => Ok(RelationshipType::Implements),
            "fixes" => Ok(RelationshipType::Fixes),
            "references" => Ok(RelationshipType::References),
            _ => Err(format!("unknown relationship type: {}", s)),
        }
    }
}

// ============================================================================
// ENTITY TYPE DISCRIMINATOR
// ============================================================================

/// Discriminator for polymorphic entity references and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum EntityType {
    Context,
    QaPair,
    Relationship,
    Scratchpad,
    Audit,
    Event,
    Lock,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            EntityType::Context => "Context",
            EntityType::QaPair => "QaPair",
            EntityType::Relationship => "Relationship",
            EntityType::Scratchpad => "Scratchpad",
            EntityType::Audit => "Audit",
            EntityType::Event => "Event",
            EntityType::Lock => "Lock",
        };
        write!(f, "{}", value)
    }
}

// ============================================================================
// TTL POLICY
// ============================================================================

/// Named TTL classes plus an explicit
/// duration escape hatch. `Persistent` never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum TtlPolicy {
    Scratchpad,
    Session,
    Cache,
    Temporary,
    Persistent,
    Duration(crate::DurationMs),
}

impl TtlPolicy {
    /// Resolve to a concrete duration in milliseconds, `None` meaning "never
    /// expires". Named classes resolve via the supplied `TtlConfig`.
    pub fn resolve_ms(&self, config: &crate::TtlConfig) -> Option<crate::DurationMs> {
        match self {
            TtlPolicy::Scratchpad => Some(config.scratchpad_ms),
            TtlPolicy::Session => Some(config.session_ms),
            TtlPolicy::Cache => Some(config.cache_ms),
            TtlPolicy::Temporary => Some(config.temporary_ms),
            TtlPolicy::Persistent => None,
            TtlPolicy::Duration(ms) => Some(*ms),
        }
    }
}

// ============================================================================
// SEARCH / DISPATCH
// ============================================================================

/// Which backend families a query may be dispatched to. `Auto` defers the
/// choice to the dispatcher, which picks a subset from the query's own
/// shape (a vector present, keyword-like text, a bare key lookup, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum SearchMode {
    Vector,
    Graph,
    Text,
    Kv,
    Hybrid,
    #[default]
    Auto,
}

/// Named dispatch policies governing how a query fans out across the
/// backends `SearchMode` selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum DispatchPolicy {
    /// Launch every selected backend concurrently, merge under a global
    /// deadline.
    #[default]
    Parallel,
    /// Try backends one at a time in a fixed priority order, stopping once
    /// enough results have accumulated.
    Sequential,
    /// Try a primary backend; on error or an empty result, try the next.
    Fallback,
    /// Parallel, but cancel slower backends once a confidence threshold has
    /// been met from the ones that already answered.
    Smart,
}

/// Outcome of dispatching to a single backend, used for source attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum BackendOutcome {
    Ok,
    TimedOut,
    Unavailable,
    Skipped,
}

// ============================================================================
// EMBEDDING STATUS
// ============================================================================

/// Reported state of embedding production for a stored context; always
/// present on a successful store_context response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    Completed,
    Failed,
    Unavailable,
}

// ============================================================================
// DELETE MODE
// ============================================================================

/// Whether a delete/forget operation is a soft hide or a hard purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    Soft,
    Hard,
}

impl fmt::Display for DeleteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if matches!(self, DeleteMode::Hard) { "hard" } else { "soft" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_type_roundtrips_through_display_and_parse() {
        for ty in [
            ContextType::Design,
            ContextType::Decision,
            ContextType::Trace,
            ContextType::Sprint,
            ContextType::Log,
            ContextType::Test,
        ] {
            let rendered = ty.to_string();
            assert_eq!(rendered.parse::<ContextType>().unwrap(), ty);
        }
    }

    #[test]
    fn unknown_context_type_is_rejected() {
        assert!("migration".parse::<ContextType>().is_err());
    }

    #[test]
    fn relationship_type_display_matches_spec_tokens() {
        assert_eq!(RelationshipType::DependsOn.to_string(), "DEPENDS_ON");
        assert_eq!(RelationshipType::PrecededBy.to_string(), "PRECEDED_BY");
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("Writer".parse::<Role>().unwrap(), Role::Writer);
    }
}
