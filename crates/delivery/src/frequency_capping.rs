//! Frequency capping — limits how often customers receive messages per
//! channel, under priority-ordered rules with exception multipliers.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use omnijourney_core::conditions::evaluate_expression;
use omnijourney_core::types::CustomerProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CappingScope {
    Global,
    Channel,
}

/// An exception that widens a rule's cap when its condition matches the
/// customer profile, e.g. champion customers at 1.5x.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapException {
    pub condition: String,
    pub multiplier: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyRule {
    pub id: Uuid,
    pub name: String,
    pub scope: CappingScope,
    pub time_window_hours: i64,
    pub max_exposures: u32,
    /// Channel ids this rule applies to; empty applies to all channels.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Lower numbers are evaluated first and can short-circuit.
    pub priority: u8,
    #[serde(default)]
    pub exceptions: Vec<CapException>,
}

impl FrequencyRule {
    pub fn new(name: &str, scope: CappingScope, time_window_hours: i64, max_exposures: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            scope,
            time_window_hours,
            max_exposures,
            channels: Vec::new(),
            priority: 10,
            exceptions: Vec::new(),
        }
    }

    fn applies_to(&self, channel_id: &str) -> bool {
        match self.scope {
            CappingScope::Global => true,
            CappingScope::Channel => {
                self.channels.is_empty() || self.channels.iter().any(|c| c == channel_id)
            }
        }
    }

    /// Cap after applying the first matching exception multiplier.
    /// Exceptions never stack.
    fn effective_cap(&self, profile: &CustomerProfile) -> f64 {
        let base = self.max_exposures as f64;
        for exception in &self.exceptions {
            if evaluate_expression(&exception.condition, |f| profile.resolve(f)) {
                return base * exception.multiplier;
            }
        }
        base
    }
}

/// Evaluates whether a customer may receive a message on a channel given
/// rolling-window exposure history. Approved sends must be recorded via
/// `record_send` so future checks see them.
pub struct FrequencyCapEngine {
    /// Kept sorted by ascending priority.
    rules: RwLock<Vec<FrequencyRule>>,
    /// (customer_id, channel_id) -> send timestamps, append-only until pruned.
    send_history: DashMap<(String, String), Vec<DateTime<Utc>>>,
}

impl FrequencyCapEngine {
    pub fn new(rules: Vec<FrequencyRule>) -> Self {
        let engine = Self {
            rules: RwLock::new(Vec::new()),
            send_history: DashMap::new(),
        };
        for rule in rules {
            engine.add_rule(rule);
        }
        engine
    }

    pub fn add_rule(&self, rule: FrequencyRule) {
        let mut rules = self.rules.write();
        rules.push(rule);
        rules.sort_by_key(|r| r.priority);
    }

    pub fn rules(&self) -> Vec<FrequencyRule> {
        self.rules.read().clone()
    }

    /// True when every applicable rule permits a send right now.
    pub fn check_frequency(
        &self,
        customer_id: &str,
        channel_id: &str,
        profile: &CustomerProfile,
    ) -> bool {
        self.check_frequency_at(customer_id, channel_id, profile, Utc::now())
    }

    pub fn check_frequency_at(
        &self,
        customer_id: &str,
        channel_id: &str,
        profile: &CustomerProfile,
        now: DateTime<Utc>,
    ) -> bool {
        self.blocking_rule_at(customer_id, channel_id, profile, now)
            .is_none()
    }

    /// Name of the first rule (in priority order) that blocks the send,
    /// if any.
    pub fn blocking_rule_at(
        &self,
        customer_id: &str,
        channel_id: &str,
        profile: &CustomerProfile,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let key = (customer_id.to_string(), channel_id.to_string());
        let history = self.send_history.get(&key);

        for rule in self.rules.read().iter() {
            if !rule.applies_to(channel_id) {
                continue;
            }
            let window_start = now - Duration::hours(rule.time_window_hours);
            let count = history
                .as_ref()
                .map(|h| h.iter().filter(|t| **t >= window_start).count())
                .unwrap_or(0);

            let cap = rule.effective_cap(profile);
            if count as f64 >= cap {
                debug!(
                    customer_id = %customer_id,
                    channel_id = %channel_id,
                    rule = %rule.name,
                    count,
                    cap,
                    "Frequency cap reached"
                );
                return Some(rule.name.clone());
            }
        }
        None
    }

    /// Record an approved send into the customer/channel history.
    pub fn record_send(&self, customer_id: &str, channel_id: &str) {
        self.record_send_at(customer_id, channel_id, Utc::now());
    }

    pub fn record_send_at(&self, customer_id: &str, channel_id: &str, at: DateTime<Utc>) {
        self.send_history
            .entry((customer_id.to_string(), channel_id.to_string()))
            .or_default()
            .push(at);
    }

    /// Count of recorded sends for (customer, channel), all time.
    pub fn send_count(&self, customer_id: &str, channel_id: &str) -> usize {
        self.send_history
            .get(&(customer_id.to_string(), channel_id.to_string()))
            .map(|h| h.len())
            .unwrap_or(0)
    }

    /// Drop history entries older than the cutoff. Returns how many were
    /// removed.
    pub fn prune_history(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for mut entry in self.send_history.iter_mut() {
            let before = entry.value().len();
            entry.value_mut().retain(|t| *t >= cutoff);
            removed += before - entry.value().len();
        }
        removed
    }
}
