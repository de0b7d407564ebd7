//! Content personalization — template rendering, rule-based overrides,
//! and real-time next-best-experience recommendations.

pub mod realtime;
pub mod templating;

pub use realtime::{
    ExperienceCandidate, ExperienceTiming, NextBestExperience, Personalization,
    RealTimePersonalizationEngine, Recommendation, RuleBasedScoring, ScoringStrategy,
};
pub use templating::{ContentPersonalizer, ContentVariant, MessageContent, PersonalizationRule};
