//! Filter expressions for search
//!
//! One flat `{field, operator, value}` condition per expression; a request
//! carries a list of them and a candidate must satisfy every one. There is
//! deliberately no nesting and no logical combinator set: a conjunction of
//! flat conditions is all the retrieval tools accept.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Filter operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
    /// Substring match (strings) or membership (arrays)
    Contains,
    /// Candidate value appears in the filter's list of values
    In,
}

/// A single filter condition applied to one metadata field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FilterExpr {
    /// Field to filter on
    pub field: String,
    /// Operator to apply
    pub operator: FilterOperator,
    /// Value to compare against (JSON value for flexibility)
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub value: serde_json::Value,
}

impl FilterExpr {
    /// Create a new filter expression.
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: serde_json::Value,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(field, FilterOperator::Eq, value)
    }

    /// Create a contains filter.
    pub fn contains(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(field, FilterOperator::Contains, value)
    }

    /// Evaluate this condition against a candidate's value for the field.
    /// A candidate that lacks the field never matches, whatever the
    /// operator; filtering on a field is an assertion that the field is
    /// present.
    pub fn matches(&self, candidate: Option<&serde_json::Value>) -> bool {
        let Some(actual) = candidate else {
            return false;
        };
        match self.operator {
            FilterOperator::Eq => actual == &self.value,
            FilterOperator::Ne => actual != &self.value,
            FilterOperator::Gt => {
                matches!(compare(actual, &self.value), Some(Ordering::Greater))
            }
            FilterOperator::Lt => {
                matches!(compare(actual, &self.value), Some(Ordering::Less))
            }
            FilterOperator::Gte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOperator::Lte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOperator::Contains => match (actual, &self.value) {
                (serde_json::Value::String(haystack), serde_json::Value::String(needle)) => {
                    haystack.contains(needle.as_str())
                }
                (serde_json::Value::Array(items), needle) => items.contains(needle),
                _ => false,
            },
            FilterOperator::In => self
                .value
                .as_array()
                .map(|allowed| allowed.contains(actual))
                .unwrap_or(false),
        }
    }
}

/// Ordering between two JSON values where one exists: numbers compare
/// numerically, strings lexically (which covers ISO-8601 timestamps).
/// Mixed or unordered types compare as `None`, so range operators on them
/// never match.
fn compare(a: &serde_json::Value, b: &serde_json::Value) -> Option<Ordering> {
    match (a, b) {
        (serde_json::Value::Number(x), serde_json::Value::Number(y)) => {
            x.as_f64()?.partial_cmp(&y.as_f64()?)
        }
        (serde_json::Value::String(x), serde_json::Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_and_ne_compare_whole_values() {
        let filter = FilterExpr::eq("context_type", json!("design"));
        assert!(filter.matches(Some(&json!("design"))));
        assert!(!filter.matches(Some(&json!("log"))));

        let filter = FilterExpr::new("context_type", FilterOperator::Ne, json!("log"));
        assert!(filter.matches(Some(&json!("design"))));
        assert!(!filter.matches(Some(&json!("log"))));
    }

    #[test]
    fn missing_field_never_matches() {
        let eq = FilterExpr::eq("tag", json!("alpha"));
        let ne = FilterExpr::new("tag", FilterOperator::Ne, json!("alpha"));
        assert!(!eq.matches(None));
        assert!(!ne.matches(None));
    }

    #[test]
    fn range_operators_order_numbers_and_strings() {
        let after = FilterExpr::new("sprint_number", FilterOperator::Gt, json!(3));
        assert!(after.matches(Some(&json!(5))));
        assert!(!after.matches(Some(&json!(2))));

        let since = FilterExpr::new("created_at", FilterOperator::Gte, json!("2026-01-01T00:00:00Z"));
        assert!(since.matches(Some(&json!("2026-06-15T09:30:00Z"))));
        assert!(!since.matches(Some(&json!("2025-12-31T23:59:59Z"))));
    }

    #[test]
    fn range_operators_never_match_mixed_types() {
        let filter = FilterExpr::new("sprint_number", FilterOperator::Gt, json!(3));
        assert!(!filter.matches(Some(&json!("5"))));
    }

    #[test]
    fn contains_covers_substrings_and_array_membership() {
        let substring = FilterExpr::contains("source", json!("import"));
        assert!(substring.matches(Some(&json!("bulk-importer"))));
        assert!(!substring.matches(Some(&json!("manual"))));

        let membership = FilterExpr::contains("tags", json!("urgent"));
        assert!(membership.matches(Some(&json!(["urgent", "backend"]))));
        assert!(!membership.matches(Some(&json!(["frontend"]))));
    }

    #[test]
    fn in_accepts_any_listed_value() {
        let filter = FilterExpr::new("context_type", FilterOperator::In, json!(["design", "decision"]));
        assert!(filter.matches(Some(&json!("decision"))));
        assert!(!filter.matches(Some(&json!("log"))));
    }
}
