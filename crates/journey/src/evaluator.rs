//! Step condition and branch evaluation.

use tracing::debug;
use uuid::Uuid;

use omnijourney_core::conditions::Condition;
use omnijourney_core::types::CustomerProfile;

use crate::types::{ConditionBranch, SplitVariant};

/// Evaluates step gates and branch selection against a customer profile.
/// Condition fields resolve from the behavioral profile first, then
/// demographics.
#[derive(Debug, Clone, Default)]
pub struct StepEvaluator;

impl StepEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// AND semantics: every condition must hold. An empty list always
    /// passes.
    pub fn evaluate_conditions(&self, conditions: &[Condition], profile: &CustomerProfile) -> bool {
        conditions
            .iter()
            .all(|c| c.matches(profile.resolve_behavioral(&c.field)))
    }

    /// First branch whose condition matches, in declaration order.
    pub fn choose_branch(
        &self,
        branches: &[ConditionBranch],
        profile: &CustomerProfile,
    ) -> Option<Uuid> {
        branches
            .iter()
            .find(|b| b.condition.matches(profile.resolve_behavioral(&b.condition.field)))
            .map(|b| b.target_step)
    }

    /// Weighted random variant selection.
    pub fn choose_split(&self, variants: &[SplitVariant]) -> Option<Uuid> {
        if variants.is_empty() {
            return None;
        }

        use rand::Rng;
        let total_weight: f64 = variants.iter().map(|v| v.weight).sum();
        if total_weight <= 0.0 {
            return Some(variants[0].target_step);
        }

        let mut rng = rand::thread_rng();
        let mut roll: f64 = rng.gen::<f64>() * total_weight;
        let mut selected = &variants[0];
        for variant in variants {
            roll -= variant.weight;
            if roll <= 0.0 {
                selected = variant;
                break;
            }
        }

        debug!(variant = %selected.name, "Split branch selected");
        Some(selected.target_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnijourney_core::conditions::ComparisonOperator;
    use serde_json::json;

    fn profile() -> CustomerProfile {
        let mut p = CustomerProfile::default();
        p.behavioral.insert("session_count".into(), json!(12));
        p.demographics.insert("country".into(), json!("PT"));
        p
    }

    fn cond(field: &str, operator: ComparisonOperator, value: serde_json::Value) -> Condition {
        Condition {
            field: field.to_string(),
            operator,
            value,
        }
    }

    #[test]
    fn test_and_semantics() {
        let evaluator = StepEvaluator::new();
        let both_true = vec![
            cond("session_count", ComparisonOperator::GreaterThan, json!(10)),
            cond("country", ComparisonOperator::Equals, json!("PT")),
        ];
        let one_false = vec![
            cond("session_count", ComparisonOperator::GreaterThan, json!(10)),
            cond("country", ComparisonOperator::Equals, json!("ES")),
        ];

        assert!(evaluator.evaluate_conditions(&both_true, &profile()));
        assert!(!evaluator.evaluate_conditions(&one_false, &profile()));
        assert!(evaluator.evaluate_conditions(&[], &profile()));
    }

    #[test]
    fn test_missing_field_fails() {
        let evaluator = StepEvaluator::new();
        let conditions = vec![cond("unknown", ComparisonOperator::Equals, json!(1))];
        assert!(!evaluator.evaluate_conditions(&conditions, &profile()));
    }

    #[test]
    fn test_choose_branch_first_match() {
        let evaluator = StepEvaluator::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let branches = vec![
            ConditionBranch {
                condition: cond("session_count", ComparisonOperator::LessThan, json!(5)),
                target_step: first,
            },
            ConditionBranch {
                condition: cond("session_count", ComparisonOperator::GreaterThan, json!(5)),
                target_step: second,
            },
        ];

        assert_eq!(evaluator.choose_branch(&branches, &profile()), Some(second));
    }

    #[test]
    fn test_choose_branch_no_match() {
        let evaluator = StepEvaluator::new();
        let branches = vec![ConditionBranch {
            condition: cond("session_count", ComparisonOperator::LessThan, json!(5)),
            target_step: Uuid::new_v4(),
        }];
        assert_eq!(evaluator.choose_branch(&branches, &profile()), None);
    }

    #[test]
    fn test_split_respects_weights() {
        let evaluator = StepEvaluator::new();
        let only = Uuid::new_v4();
        let never = Uuid::new_v4();
        let variants = vec![
            SplitVariant {
                name: "all".into(),
                weight: 1.0,
                target_step: only,
            },
            SplitVariant {
                name: "none".into(),
                weight: 0.0,
                target_step: never,
            },
        ];

        for _ in 0..50 {
            assert_eq!(evaluator.choose_split(&variants), Some(only));
        }
        assert_eq!(evaluator.choose_split(&[]), None);
    }
}
