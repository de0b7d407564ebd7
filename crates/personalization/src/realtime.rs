//! Real-time personalization — ranked experience recommendations and the
//! single next-best experience, scored by a pluggable strategy.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use omnijourney_core::event_bus::{make_event, EventSink, JourneyEventType};
use omnijourney_core::types::CustomerProfile;

/// A candidate experience that can be recommended to a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceCandidate {
    pub id: String,
    pub channel: String,
    pub content: String,
    /// Predicted incremental value before contextual adjustments.
    pub base_value: f64,
    /// Real-time channels qualify for immediate triggering.
    pub real_time: bool,
    pub active: bool,
}

/// When the recommended experience should fire. `Immediate` means the
/// caller triggers it synchronously instead of queueing it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ExperienceTiming {
    Immediate,
    Scheduled { at: DateTime<Utc> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub experience_id: String,
    pub channel: String,
    pub content: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextBestExperience {
    pub channel: String,
    pub content: String,
    pub timing: ExperienceTiming,
    pub confidence: f64,
}

/// Output of one personalization pass for a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Personalization {
    pub customer_id: String,
    pub recommendations: Vec<Recommendation>,
    pub next_best: Option<NextBestExperience>,
    pub generated_at: DateTime<Utc>,
}

/// Scores a candidate experience for a customer in context. Swapping the
/// implementation is how a real model plugs in later.
pub trait ScoringStrategy: Send + Sync {
    fn score(
        &self,
        candidate: &ExperienceCandidate,
        profile: &CustomerProfile,
        context: &HashMap<String, serde_json::Value>,
    ) -> f64;
}

/// Deterministic heuristic scoring: base value adjusted by engagement,
/// channel affinity, and live-session signals.
pub struct RuleBasedScoring;

impl ScoringStrategy for RuleBasedScoring {
    fn score(
        &self,
        candidate: &ExperienceCandidate,
        profile: &CustomerProfile,
        context: &HashMap<String, serde_json::Value>,
    ) -> f64 {
        let mut score = candidate.base_value;

        if let Some(engagement) = context.get("engagement_score").and_then(|v| v.as_f64()) {
            score += 0.2 * engagement;
        }

        let preferred = profile
            .preferences
            .get("preferred_channel")
            .and_then(|v| v.as_str());
        if preferred == Some(candidate.channel.as_str()) {
            score += 0.15;
        }

        let session_active = context
            .get("session_active")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if session_active && candidate.real_time {
            score += 0.1;
        }

        score.clamp(0.0, 1.0)
    }
}

/// Wraps an injected predict function — the external-model variant of the
/// strategy.
pub struct ExternalModelScoring {
    predict: Box<dyn Fn(&ExperienceCandidate, &CustomerProfile) -> f64 + Send + Sync>,
}

impl ExternalModelScoring {
    pub fn new(
        predict: impl Fn(&ExperienceCandidate, &CustomerProfile) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            predict: Box::new(predict),
        }
    }
}

impl ScoringStrategy for ExternalModelScoring {
    fn score(
        &self,
        candidate: &ExperienceCandidate,
        profile: &CustomerProfile,
        _context: &HashMap<String, serde_json::Value>,
    ) -> f64 {
        (self.predict)(candidate, profile).clamp(0.0, 1.0)
    }
}

const MAX_RECOMMENDATIONS: usize = 5;

/// Produces ranked experience recommendations per customer, caching the
/// latest result for the refresh tick.
pub struct RealTimePersonalizationEngine {
    candidates: DashMap<String, ExperienceCandidate>,
    strategy: Arc<dyn ScoringStrategy>,
    cache: DashMap<String, Personalization>,
    event_sink: Arc<dyn EventSink>,
}

impl RealTimePersonalizationEngine {
    pub fn new(strategy: Arc<dyn ScoringStrategy>) -> Self {
        Self {
            candidates: DashMap::new(),
            strategy,
            cache: DashMap::new(),
            event_sink: omnijourney_core::event_bus::noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn register_experience(&self, candidate: ExperienceCandidate) {
        self.candidates.insert(candidate.id.clone(), candidate);
    }

    /// Score all active candidates and produce ranked recommendations plus
    /// the next-best experience.
    pub fn generate(
        &self,
        customer_id: &str,
        profile: &CustomerProfile,
        context: &HashMap<String, serde_json::Value>,
    ) -> Personalization {
        let now = Utc::now();

        let mut scored: Vec<Recommendation> = self
            .candidates
            .iter()
            .filter(|entry| entry.value().active)
            .map(|entry| {
                let candidate = entry.value();
                Recommendation {
                    experience_id: candidate.id.clone(),
                    channel: candidate.channel.clone(),
                    content: candidate.content.clone(),
                    score: self.strategy.score(candidate, profile, context),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(MAX_RECOMMENDATIONS);

        let next_best = scored.first().map(|top| {
            let candidate_real_time = self
                .candidates
                .get(&top.experience_id)
                .map(|c| c.real_time)
                .unwrap_or(false);
            let timing = if candidate_real_time {
                ExperienceTiming::Immediate
            } else {
                ExperienceTiming::Scheduled {
                    at: now + Duration::hours(1),
                }
            };
            let confidence = match scored.get(1) {
                Some(second) if top.score + second.score > 0.0 => {
                    (top.score / (top.score + second.score)).clamp(0.5, 0.99)
                }
                _ => 0.9,
            };
            NextBestExperience {
                channel: top.channel.clone(),
                content: top.content.clone(),
                timing,
                confidence,
            }
        });

        let personalization = Personalization {
            customer_id: customer_id.to_string(),
            recommendations: scored,
            next_best,
            generated_at: now,
        };

        self.cache
            .insert(customer_id.to_string(), personalization.clone());

        info!(
            customer_id = %customer_id,
            recommendations = personalization.recommendations.len(),
            "Real-time personalization generated"
        );
        self.event_sink.emit(make_event(
            JourneyEventType::RealTimePersonalizationGenerated,
            Some(customer_id.to_string()),
            personalization.next_best.as_ref().map(|n| n.channel.clone()),
            None,
        ));

        personalization
    }

    pub fn cached(&self, customer_id: &str) -> Option<Personalization> {
        self.cache.get(customer_id).map(|p| p.clone())
    }

    /// Return the cached result if fresh enough, otherwise regenerate.
    pub fn refresh(
        &self,
        customer_id: &str,
        profile: &CustomerProfile,
        context: &HashMap<String, serde_json::Value>,
        max_age: Duration,
    ) -> Personalization {
        if let Some(cached) = self.cached(customer_id) {
            if Utc::now() - cached.generated_at < max_age {
                return cached;
            }
        }
        self.generate(customer_id, profile, context)
    }
}
