//! Message content rendering: `{{key}}` variable substitution against the
//! customer profile plus priority-ordered rule overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use omnijourney_core::conditions::evaluate_expression;
use omnijourney_core::types::CustomerProfile;

/// A rule that replaces the whole template when its condition matches.
/// Conditions are `{{field}} op value` expressions; malformed conditions
/// fail closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalizationRule {
    pub condition: String,
    /// Replacement template, or the name of a variant to use.
    pub content: String,
    /// Higher priority wins among matching rules.
    pub priority: i32,
}

/// A named alternate body a rule can select by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentVariant {
    pub name: String,
    pub content: String,
}

/// Template plus everything needed to resolve it for one customer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageContent {
    pub template: String,
    /// Per-send variable overrides, substituted before profile lookup.
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub personalization_rules: Vec<PersonalizationRule>,
    #[serde(default)]
    pub variants: Vec<ContentVariant>,
    /// Used when rendering produces an empty body.
    #[serde(default)]
    pub fallback: Option<String>,
}

impl MessageContent {
    pub fn from_template(template: &str) -> Self {
        Self {
            template: template.to_string(),
            ..Default::default()
        }
    }
}

/// Resolves message content against a customer profile.
#[derive(Debug, Clone, Default)]
pub struct ContentPersonalizer;

impl ContentPersonalizer {
    pub fn new() -> Self {
        Self
    }

    /// Render `content` for the given profile. Never fails: rule
    /// evaluation errors are non-matches, unresolved variables become the
    /// empty string, and an empty result falls back to
    /// `content.fallback`.
    pub fn personalize(&self, content: &MessageContent, profile: &CustomerProfile) -> String {
        let template = self
            .select_rule_override(content, profile)
            .unwrap_or_else(|| content.template.clone());

        let rendered = self.render(&template, &content.variables, profile);
        if rendered.trim().is_empty() {
            if let Some(fallback) = &content.fallback {
                return self.render(fallback, &content.variables, profile);
            }
        }
        rendered
    }

    /// Among matching rules, the highest-priority one replaces the
    /// template. A rule whose content names a variant resolves to that
    /// variant's body.
    fn select_rule_override(
        &self,
        content: &MessageContent,
        profile: &CustomerProfile,
    ) -> Option<String> {
        let mut matching: Vec<&PersonalizationRule> = content
            .personalization_rules
            .iter()
            .filter(|rule| evaluate_expression(&rule.condition, |f| profile.resolve(f)))
            .collect();
        if matching.is_empty() {
            return None;
        }
        matching.sort_by_key(|rule| std::cmp::Reverse(rule.priority));
        let winner = matching[0];
        debug!(priority = winner.priority, "Personalization rule override selected");

        let body = content
            .variants
            .iter()
            .find(|v| v.name == winner.content)
            .map(|v| v.content.clone())
            .unwrap_or_else(|| winner.content.clone());
        Some(body)
    }

    /// Replace every `{{key}}` token. Explicit variables win, then the
    /// profile (demographics, behavioral, preferences), then the empty
    /// string.
    fn render(
        &self,
        template: &str,
        variables: &HashMap<String, serde_json::Value>,
        profile: &CustomerProfile,
    ) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let key = after[..end].trim();
                    let value = variables
                        .get(key)
                        .filter(|v| !v.is_null())
                        .or_else(|| profile.resolve(key));
                    out.push_str(&display_value(value));
                    rest = &after[end + 2..];
                }
                None => {
                    // Unterminated token: emit verbatim.
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn display_value(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
