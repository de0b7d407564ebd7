use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Messaging channel families supported by the orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Email,
    Sms,
    Push,
    Web,
    Ads,
}

impl ChannelType {
    pub fn display_name(&self) -> &'static str {
        match self {
            ChannelType::Email => "Email",
            ChannelType::Sms => "SMS",
            ChannelType::Push => "Push Notification",
            ChannelType::Web => "Web",
            ChannelType::Ads => "Paid Ads",
        }
    }

    /// Whether the channel can react to events within a session.
    pub fn is_real_time(&self) -> bool {
        matches!(self, ChannelType::Push | ChannelType::Web)
    }
}

/// Customer personalization profile: three layered attribute maps.
///
/// Field resolution walks demographics, then behavioral, then preferences,
/// returning the first non-null value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerProfile {
    #[serde(default)]
    pub demographics: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub behavioral: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub preferences: HashMap<String, serde_json::Value>,
}

impl CustomerProfile {
    /// First non-null value for `field` across demographics, behavioral,
    /// preferences — the template-variable resolution order.
    pub fn resolve(&self, field: &str) -> Option<&serde_json::Value> {
        [&self.demographics, &self.behavioral, &self.preferences]
            .into_iter()
            .filter_map(|map| map.get(field))
            .find(|v| !v.is_null())
    }

    /// Resolution order used by step conditions: behavioral, then
    /// demographics.
    pub fn resolve_behavioral(&self, field: &str) -> Option<&serde_json::Value> {
        [&self.behavioral, &self.demographics]
            .into_iter()
            .filter_map(|map| map.get(field))
            .find(|v| !v.is_null())
    }
}

/// Consent flags attached to customer constraints.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConsentFlags {
    pub gdpr_consent: bool,
    pub email_opt_in: bool,
    pub sms_opt_in: bool,
    pub push_opt_in: bool,
    pub personalization_consent: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Per-customer messaging constraints supplied at journey creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerConstraints {
    /// Channel ids the customer may never be contacted on.
    #[serde(default)]
    pub blacklisted_channels: Vec<String>,
    /// Channel ids the customer has explicitly opted out of.
    #[serde(default)]
    pub opt_outs: Vec<String>,
    #[serde(default)]
    pub consent: ConsentFlags,
}

impl CustomerConstraints {
    /// A channel is forbidden when blacklisted or opted out.
    pub fn forbids(&self, channel_id: &str) -> bool {
        self.blacklisted_channels.iter().any(|c| c == channel_id)
            || self.opt_outs.iter().any(|c| c == channel_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_resolution_order() {
        let mut profile = CustomerProfile::default();
        profile.demographics.insert("city".into(), json!("Lisbon"));
        profile.behavioral.insert("city".into(), json!("Porto"));
        profile.preferences.insert("tone".into(), json!("casual"));

        assert_eq!(profile.resolve("city"), Some(&json!("Lisbon")));
        assert_eq!(profile.resolve("tone"), Some(&json!("casual")));
        assert_eq!(profile.resolve("missing"), None);
    }

    #[test]
    fn test_profile_null_values_skipped() {
        let mut profile = CustomerProfile::default();
        profile.demographics.insert("tier".into(), json!(null));
        profile.behavioral.insert("tier".into(), json!("champion"));

        assert_eq!(profile.resolve("tier"), Some(&json!("champion")));
    }

    #[test]
    fn test_behavioral_resolution_prefers_behavioral() {
        let mut profile = CustomerProfile::default();
        profile.demographics.insert("visits".into(), json!(1));
        profile.behavioral.insert("visits".into(), json!(12));

        assert_eq!(profile.resolve_behavioral("visits"), Some(&json!(12)));
    }

    #[test]
    fn test_constraints_forbid() {
        let constraints = CustomerConstraints {
            blacklisted_channels: vec!["ads".into()],
            opt_outs: vec!["sms".into()],
            consent: ConsentFlags::default(),
        };
        assert!(constraints.forbids("ads"));
        assert!(constraints.forbids("sms"));
        assert!(!constraints.forbids("email"));
    }
}
