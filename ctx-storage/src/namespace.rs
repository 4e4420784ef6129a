//! Namespace paths: `/global/` | `/project/{id}/` | `/team/{id}/` |
//! `/user/{id}/`.
//!
//! A private inner value forces every namespace to come through
//! [`Namespace::parse`] or [`Namespace::assign`], never built by formatting
//! a raw string at the call site. A namespace is a small closed set of path
//! shapes, so the scoped value is a plain owned `String`.

use ctx_core::{CtxError, CtxResult, ValidationError};
use serde::{Deserialize, Serialize};

/// The four namespace scopes, in assignment precedence order: `project`
/// before `team` before `user` before `global`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceScope {
    Global,
    Project,
    Team,
    User,
}

/// A validated namespace path. Construct only via [`Namespace::parse`] or
/// [`Namespace::assign`]; there is no public constructor that skips
/// validation. The namespace of a context is set at creation and never
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Namespace(String);

/// Fields a caller may supply when asking the manager to derive a namespace
/// from context rather than naming one explicitly.
#[derive(Debug, Clone, Default)]
pub struct NamespaceHint {
    pub project_id: Option<String>,
    pub team_id: Option<String>,
    pub user_id: Option<String>,
}

impl Namespace {
    /// Parse a raw path into a validated namespace, rejecting anything that
    /// doesn't match one of the four fixed shapes.
    pub fn parse(path: &str) -> CtxResult<Self> {
        if path == "/global/" {
            return Ok(Self(path.to_string()));
        }
        for prefix in ["/project/", "/team/", "/user/"] {
            if let Some(rest) = path.strip_prefix(prefix) {
                if let Some(id) = rest.strip_suffix('/') {
                    if !id.is_empty() && !id.contains('/') {
                        return Ok(Self(path.to_string()));
                    }
                }
            }
        }
        Err(CtxError::Validation(ValidationError::ConstraintViolation {
            constraint: "namespace_shape".to_string(),
            reason: format!(
                "namespace '{path}' does not match /global/, /project/{{id}}/, /team/{{id}}/, or /user/{{id}}/"
            ),
        }))
    }

    /// Derive a namespace from supplied content using the fixed precedence:
    /// project, then team, then user, else global.
    pub fn assign(hint: &NamespaceHint) -> Self {
        if let Some(id) = &hint.project_id {
            return Self(format!("/project/{id}/"));
        }
        if let Some(id) = &hint.team_id {
            return Self(format!("/team/{id}/"));
        }
        if let Some(id) = &hint.user_id {
            return Self(format!("/user/{id}/"));
        }
        Self("/global/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scope(&self) -> NamespaceScope {
        match self.0.split('/').nth(1) {
            Some("project") => NamespaceScope::Project,
            Some("team") => NamespaceScope::Team,
            Some("user") => NamespaceScope::User,
            _ => NamespaceScope::Global,
        }
    }

    /// Scoped entity id for `/project/{id}/`, `/team/{id}/`, `/user/{id}/`;
    /// `None` for `/global/`.
    pub fn scope_id(&self) -> Option<&str> {
        let parts: Vec<&str> = self.0.trim_matches('/').split('/').collect();
        match parts.as_slice() {
            [scope, id] if *scope != "global" => Some(id),
            _ => None,
        }
    }

    /// Default data-retention TTL for this scope in milliseconds: global
    /// 30d, team 7d, user 1d, project 14d. This is unrelated to lock TTL,
    /// which is always short.
    pub fn default_retention_ms(&self) -> i64 {
        const DAY_MS: i64 = 86_400_000;
        match self.scope() {
            NamespaceScope::Global => 30 * DAY_MS,
            NamespaceScope::Team => 7 * DAY_MS,
            NamespaceScope::User => DAY_MS,
            NamespaceScope::Project => 14 * DAY_MS,
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_all_four_shapes() {
        assert!(Namespace::parse("/global/").is_ok());
        assert!(Namespace::parse("/project/abc/").is_ok());
        assert!(Namespace::parse("/team/abc/").is_ok());
        assert!(Namespace::parse("/user/abc/").is_ok());
    }

    #[test]
    fn parse_rejects_malformed_paths() {
        assert!(Namespace::parse("/projects/abc/").is_err());
        assert!(Namespace::parse("/project//").is_err());
        assert!(Namespace::parse("project/abc/").is_err());
        assert!(Namespace::parse("/project/a/b/").is_err());
    }

    #[test]
    fn assign_follows_project_team_user_global_precedence() {
        let hint = NamespaceHint {
            project_id: Some("p1".to_string()),
            team_id: Some("t1".to_string()),
            user_id: Some("u1".to_string()),
        };
        assert_eq!(Namespace::assign(&hint).as_str(), "/project/p1/");

        let hint = NamespaceHint {
            project_id: None,
            team_id: Some("t1".to_string()),
            user_id: Some("u1".to_string()),
        };
        assert_eq!(Namespace::assign(&hint).as_str(), "/team/t1/");

        let hint = NamespaceHint::default();
        assert_eq!(Namespace::assign(&hint).as_str(), "/global/");
    }

    #[test]
    fn default_retention_matches_scope() {
        assert_eq!(
            Namespace::parse("/user/u1/").unwrap().default_retention_ms(),
            86_400_000
        );
        assert_eq!(
            Namespace::parse("/global/").unwrap().default_retention_ms(),
            30 * 86_400_000
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn assigned_namespaces_always_parse(id in "[A-Za-z0-9_-]{1,32}") {
                for hint in [
                    NamespaceHint { project_id: Some(id.clone()), ..Default::default() },
                    NamespaceHint { team_id: Some(id.clone()), ..Default::default() },
                    NamespaceHint { user_id: Some(id.clone()), ..Default::default() },
                ] {
                    let assigned = Namespace::assign(&hint);
                    prop_assert!(Namespace::parse(assigned.as_str()).is_ok());
                }
            }

            #[test]
            fn retention_is_always_positive(id in "[a-z0-9]{1,16}") {
                let ns = Namespace::assign(&NamespaceHint {
                    project_id: Some(id),
                    ..Default::default()
                });
                prop_assert!(ns.default_retention_ms() > 0);
            }
        }
    }
}
