//! Condition predicates shared by step gating, capping exceptions, and
//! personalization rules.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    NotContains,
}

/// A single field/operator/value predicate evaluated against a customer
/// profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ComparisonOperator,
    pub value: serde_json::Value,
}

impl Condition {
    /// Evaluate against an already-resolved field value. A missing field
    /// fails closed for every operator.
    pub fn matches(&self, actual: Option<&serde_json::Value>) -> bool {
        match actual {
            Some(value) => compare_values(value, &self.operator, &self.value),
            None => false,
        }
    }
}

#[allow(clippy::unnecessary_map_or)]
pub fn compare_values(
    actual: &serde_json::Value,
    operator: &ComparisonOperator,
    expected: &serde_json::Value,
) -> bool {
    match operator {
        ComparisonOperator::Equals => loose_eq(actual, expected),
        ComparisonOperator::NotEquals => !loose_eq(actual, expected),
        ComparisonOperator::GreaterThan => {
            numeric_cmp(actual, expected).map_or(false, |o| o == std::cmp::Ordering::Greater)
        }
        ComparisonOperator::LessThan => {
            numeric_cmp(actual, expected).map_or(false, |o| o == std::cmp::Ordering::Less)
        }
        ComparisonOperator::Contains => actual
            .as_str()
            .zip(expected.as_str())
            .map_or(false, |(a, e)| a.contains(e)),
        ComparisonOperator::NotContains => actual
            .as_str()
            .zip(expected.as_str())
            .map_or(false, |(a, e)| !a.contains(e)),
    }
}

/// Equality that tolerates integer/float representation differences.
fn loose_eq(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    if a == b {
        return true;
    }
    matches!(numeric_cmp(a, b), Some(std::cmp::Ordering::Equal))
}

fn numeric_cmp(a: &serde_json::Value, b: &serde_json::Value) -> Option<std::cmp::Ordering> {
    let a_num = a.as_f64()?;
    let b_num = b.as_f64()?;
    a_num.partial_cmp(&b_num)
}

/// Parse a `{{field}} <op> <value>` expression, e.g.
/// `{{loyalty_tier}} == "champion"` or `{{session_count}} > 10`.
///
/// Returns `None` for anything malformed; callers treat that as a
/// non-match rather than an error.
pub fn parse_expression(expr: &str) -> Option<Condition> {
    let expr = expr.trim();
    let rest = expr.strip_prefix("{{")?;
    let (field, rest) = rest.split_once("}}")?;
    let field = field.trim();
    if field.is_empty() {
        return None;
    }

    let rest = rest.trim();
    let (operator, value_str) = if let Some(v) = rest.strip_prefix("==") {
        (ComparisonOperator::Equals, v)
    } else if let Some(v) = rest.strip_prefix("!=") {
        (ComparisonOperator::NotEquals, v)
    } else if let Some(v) = rest.strip_prefix('>') {
        (ComparisonOperator::GreaterThan, v)
    } else if let Some(v) = rest.strip_prefix('<') {
        (ComparisonOperator::LessThan, v)
    } else if let Some(v) = rest.strip_prefix("not_contains") {
        (ComparisonOperator::NotContains, v)
    } else if let Some(v) = rest.strip_prefix("contains") {
        (ComparisonOperator::Contains, v)
    } else {
        return None;
    };

    let value_str = value_str.trim();
    if value_str.is_empty() {
        return None;
    }

    Some(Condition {
        field: field.to_string(),
        operator,
        value: parse_literal(value_str),
    })
}

/// Evaluate an expression string with a field resolver. Any parse or
/// resolution failure yields `false`.
pub fn evaluate_expression<'a, F>(expr: &str, resolve: F) -> bool
where
    F: Fn(&str) -> Option<&'a serde_json::Value>,
{
    match parse_expression(expr) {
        Some(condition) => condition.matches(resolve(&condition.field)),
        None => false,
    }
}

fn parse_literal(raw: &str) -> serde_json::Value {
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
    if let Some(s) = unquoted {
        return serde_json::Value::String(s.to_string());
    }
    match raw {
        "true" => return serde_json::Value::Bool(true),
        "false" => return serde_json::Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = raw.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return serde_json::Value::Number(num);
        }
    }
    serde_json::Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_string_equality() {
        let cond = parse_expression("{{loyalty_tier}} == \"champion\"").unwrap();
        assert_eq!(cond.field, "loyalty_tier");
        assert_eq!(cond.operator, ComparisonOperator::Equals);
        assert!(cond.matches(Some(&json!("champion"))));
        assert!(!cond.matches(Some(&json!("bronze"))));
    }

    #[test]
    fn test_parse_numeric_comparison() {
        let cond = parse_expression("{{session_count}} > 10").unwrap();
        assert!(cond.matches(Some(&json!(11))));
        assert!(!cond.matches(Some(&json!(10))));
        assert!(!cond.matches(Some(&json!(3))));
    }

    #[test]
    fn test_parse_contains() {
        let cond = parse_expression("{{interests}} contains \"running\"").unwrap();
        assert!(cond.matches(Some(&json!("trail running"))));
        assert!(!cond.matches(Some(&json!("cycling"))));
    }

    #[test]
    fn test_malformed_expressions_yield_none() {
        assert!(parse_expression("loyalty_tier == champion").is_none());
        assert!(parse_expression("{{}} == 1").is_none());
        assert!(parse_expression("{{x}} ~= 1").is_none());
        assert!(parse_expression("{{x}} ==").is_none());
    }

    #[test]
    fn test_missing_field_fails_closed() {
        let cond = parse_expression("{{tier}} != \"gold\"").unwrap();
        // Even a negated operator is a non-match when the field is absent.
        assert!(!cond.matches(None));
    }

    #[test]
    fn test_evaluate_expression_fail_closed() {
        let profile_value = json!("champion");
        let resolve = |field: &str| {
            if field == "tier" {
                Some(&profile_value)
            } else {
                None
            }
        };
        assert!(evaluate_expression("{{tier}} == \"champion\"", resolve));
        assert!(!evaluate_expression("{{other}} == \"champion\"", resolve));
        assert!(!evaluate_expression("garbage", resolve));
    }

    #[test]
    fn test_numeric_equality_across_representations() {
        let cond = parse_expression("{{score}} == 5").unwrap();
        assert!(cond.matches(Some(&json!(5))));
        assert!(cond.matches(Some(&json!(5.0))));
    }
}
