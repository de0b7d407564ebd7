use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use omnijourney_core::conditions::Condition;
use omnijourney_core::types::{CustomerConstraints, CustomerProfile};
use omnijourney_delivery::ChannelPreference;
use omnijourney_personalization::MessageContent;

/// Funnel stage a journey targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStage {
    Awareness,
    Consideration,
    Conversion,
    Retention,
    Advocacy,
}

/// Lifecycle status of a customer journey, checked before every dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

/// A branch inside a condition step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionBranch {
    pub condition: Condition,
    pub target_step: Uuid,
}

/// A weighted branch inside a split step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitVariant {
    pub name: String,
    pub weight: f64,
    pub target_step: Uuid,
}

/// The kind of work a step performs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StepType {
    /// Deliver the step's content on its target channel.
    Message,
    /// Delay the following step without blocking the scheduler.
    Wait { duration_secs: u64 },
    /// Re-evaluate and jump to the first matching branch.
    Condition { branches: Vec<ConditionBranch> },
    /// Invoke an external side-effecting collaborator (CRM update etc.).
    Action { name: String },
    /// Fan out to one branch by weighted distribution.
    Split { variants: Vec<SplitVariant> },
}

/// How long after a step is queued before it becomes ready.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StepTiming {
    #[serde(default)]
    pub delay_secs: u64,
}

/// One unit of work in a customer's journey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyStep {
    pub id: Uuid,
    pub name: String,
    pub step_type: StepType,
    /// Target channel id for message steps.
    pub channel: Option<String>,
    pub content: Option<MessageContent>,
    #[serde(default)]
    pub timing: StepTiming,
    /// All conditions must hold for the step to execute (AND semantics).
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// On execution error, the first fallback replaces the failed step at
    /// the front of the queue.
    #[serde(default)]
    pub fallback_steps: Vec<JourneyStep>,
}

fn default_priority() -> u8 {
    5
}

impl JourneyStep {
    pub fn message(name: &str, channel: &str, content: MessageContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            step_type: StepType::Message,
            channel: Some(channel.to_string()),
            content: Some(content),
            timing: StepTiming::default(),
            conditions: Vec::new(),
            priority: default_priority(),
            fallback_steps: Vec::new(),
        }
    }

    pub fn wait(name: &str, duration_secs: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            step_type: StepType::Wait { duration_secs },
            channel: None,
            content: None,
            timing: StepTiming::default(),
            conditions: Vec::new(),
            priority: default_priority(),
            fallback_steps: Vec::new(),
        }
    }

    pub fn action(name: &str, action: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            step_type: StepType::Action {
                name: action.to_string(),
            },
            channel: None,
            content: None,
            timing: StepTiming::default(),
            conditions: Vec::new(),
            priority: default_priority(),
            fallback_steps: Vec::new(),
        }
    }
}

/// Outcome of an executed (or skipped/failed) step, kept in journey
/// history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum StepOutcome {
    Sent,
    Skipped { reason: String },
    Waited { duration_secs: u64 },
    Branched { target_step: Uuid },
    ActionInvoked { action: String },
    Failed { error: String },
}

/// Append-only record of one step resolution in a journey's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyHistoryEvent {
    pub timestamp: DateTime<Utc>,
    pub step_id: Uuid,
    pub step_name: String,
    pub channel: Option<String>,
    pub content: Option<String>,
    pub message_id: Option<String>,
    pub outcome: StepOutcome,
    /// Engagement data attached later by tracking callbacks.
    pub engagement: Option<serde_json::Value>,
    /// Attribution credit attached after conversion computation.
    pub attribution: Option<serde_json::Value>,
}

/// A customer's multi-step journey. One active journey per customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerJourney {
    pub journey_id: Uuid,
    pub customer_id: String,
    pub template_name: String,
    pub stage: JourneyStage,
    pub status: JourneyStatus,
    pub current_step: Option<Uuid>,
    pub remaining_steps: VecDeque<JourneyStep>,
    pub profile: CustomerProfile,
    pub channel_preferences: HashMap<String, ChannelPreference>,
    pub constraints: CustomerConstraints,
    pub history: Vec<JourneyHistoryEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A reusable journey definition customers are enrolled into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyTemplate {
    pub name: String,
    pub description: String,
    pub stage: JourneyStage,
    pub steps: Vec<JourneyStep>,
}

/// Upstream template catalog. External in production; the in-memory store
/// covers tests and the demo binary.
pub trait JourneyTemplateStore: Send + Sync {
    fn load_journey_template(&self, name: &str) -> Option<JourneyTemplate>;
}

pub struct InMemoryTemplateStore {
    templates: DashMap<String, JourneyTemplate>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
        }
    }

    pub fn insert(&self, template: JourneyTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Seed a small onboarding template for development and demos.
    pub fn seed_demo_templates(&self) {
        let steps = vec![
            JourneyStep::message(
                "welcome_email",
                "email",
                MessageContent::from_template("Welcome, {{first_name}}!"),
            ),
            JourneyStep::wait("settle_in", 86_400),
            JourneyStep::message(
                "tips_push",
                "push",
                MessageContent::from_template("{{first_name}}, here are three tips to start"),
            ),
        ];
        self.insert(JourneyTemplate {
            name: "welcome_series".to_string(),
            description: "Onboarding sequence for new customers".to_string(),
            stage: JourneyStage::Awareness,
            steps,
        });
    }
}

impl JourneyTemplateStore for InMemoryTemplateStore {
    fn load_journey_template(&self, name: &str) -> Option<JourneyTemplate> {
        self.templates.get(name).map(|t| t.clone())
    }
}

impl Default for InMemoryTemplateStore {
    fn default() -> Self {
        Self::new()
    }
}
