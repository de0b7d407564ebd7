//! Journey orchestrator — drives queued steps through the
//! condition → capping → personalize → dispatch → record → schedule-next
//! pipeline, one step per scheduler tick.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use omnijourney_channels::{ChannelRegistry, MessageGateway};
use omnijourney_core::config::JourneyConfig;
use omnijourney_core::event_bus::{make_event, EventSink, JourneyEventType, OrchestrationEvent};
use omnijourney_core::types::{CustomerConstraints, CustomerProfile};
use omnijourney_core::{OrchestratorError, OrchestratorResult};
use omnijourney_delivery::{next_window_start, ChannelPreference, FrequencyCapEngine};
use omnijourney_personalization::{
    ContentPersonalizer, Personalization, RealTimePersonalizationEngine, RuleBasedScoring,
};
use omnijourney_reporting::attribution::{AttributionEngine, AttributionRecord, Touchpoint};
use omnijourney_reporting::metrics::{
    AttributionSummary, ChannelSummary, JourneyCounts, OmnichannelMetrics,
};

use crate::evaluator::StepEvaluator;
use crate::queue::{ScheduledStep, StepQueue};
use crate::state_machine::JourneyStatusMachine;
use crate::types::{
    CustomerJourney, JourneyHistoryEvent, JourneyStatus, JourneyStep, JourneyTemplateStore,
    StepOutcome, StepType,
};

/// External side-effecting collaborator invoked by action steps
/// (CRM updates, segment changes, webhooks).
pub trait ActionHandler: Send + Sync {
    fn execute(
        &self,
        action: &str,
        customer_id: &str,
        profile: &CustomerProfile,
    ) -> OrchestratorResult<()>;
}

/// Default handler that acknowledges every action.
pub struct NoOpActionHandler;

impl ActionHandler for NoOpActionHandler {
    fn execute(
        &self,
        action: &str,
        customer_id: &str,
        _profile: &CustomerProfile,
    ) -> OrchestratorResult<()> {
        info!(action = %action, customer_id = %customer_id, "Action acknowledged");
        Ok(())
    }
}

/// How a single queued step resolved.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "resolution")]
pub enum StepResolution {
    MessageSent { message_id: String },
    Skipped { reason: String },
    Deferred { until: DateTime<Utc> },
    WaitScheduled { until: DateTime<Utc> },
    Branched { target_step: Uuid },
    ActionInvoked,
    Failed { error: String },
    Dropped,
}

/// Outcome of one scheduler tick that found a ready step.
#[derive(Debug, Clone, Serialize)]
pub struct TickOutcome {
    pub customer_id: String,
    pub step_name: String,
    pub resolution: StepResolution,
}

/// Holds all journeys and shared engines; every subsystem is injected so
/// tests construct isolated state per test.
pub struct JourneyOrchestrator {
    journeys: DashMap<String, CustomerJourney>,
    queue: StepQueue,
    evaluator: StepEvaluator,
    status_machine: JourneyStatusMachine,
    personalizer: ContentPersonalizer,
    registry: Arc<ChannelRegistry>,
    capping: Arc<FrequencyCapEngine>,
    gateway: Arc<dyn MessageGateway>,
    templates: Arc<dyn JourneyTemplateStore>,
    actions: Arc<dyn ActionHandler>,
    attribution: Arc<AttributionEngine>,
    realtime: Arc<RealTimePersonalizationEngine>,
    event_sink: Arc<dyn EventSink>,
    config: JourneyConfig,
}

impl JourneyOrchestrator {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        capping: Arc<FrequencyCapEngine>,
        gateway: Arc<dyn MessageGateway>,
        templates: Arc<dyn JourneyTemplateStore>,
    ) -> Self {
        Self {
            journeys: DashMap::new(),
            queue: StepQueue::new(),
            evaluator: StepEvaluator::new(),
            status_machine: JourneyStatusMachine::new(),
            personalizer: ContentPersonalizer::new(),
            registry,
            capping,
            gateway,
            templates,
            actions: Arc::new(NoOpActionHandler),
            attribution: Arc::new(AttributionEngine::new()),
            realtime: Arc::new(RealTimePersonalizationEngine::new(Arc::new(RuleBasedScoring))),
            event_sink: omnijourney_core::event_bus::noop_sink(),
            config: JourneyConfig::default(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn with_action_handler(mut self, actions: Arc<dyn ActionHandler>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_attribution(mut self, attribution: Arc<AttributionEngine>) -> Self {
        self.attribution = attribution;
        self
    }

    pub fn with_realtime(mut self, realtime: Arc<RealTimePersonalizationEngine>) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn with_config(mut self, config: JourneyConfig) -> Self {
        self.config = config;
        self
    }

    // ------------------------------------------------------------------
    // Journey lifecycle
    // ------------------------------------------------------------------

    /// Enroll a customer into a journey template. At most one non-terminal
    /// journey per customer.
    pub fn create_customer_journey(
        &self,
        customer_id: &str,
        template_name: &str,
        profile: CustomerProfile,
        channel_preferences: HashMap<String, ChannelPreference>,
        constraints: CustomerConstraints,
    ) -> OrchestratorResult<Uuid> {
        if let Some(existing) = self.journeys.get(customer_id) {
            if matches!(existing.status, JourneyStatus::Active | JourneyStatus::Paused) {
                return Err(OrchestratorError::Journey(format!(
                    "customer {} is already in journey {}",
                    customer_id, existing.journey_id
                )));
            }
        }

        let active = self
            .journeys
            .iter()
            .filter(|j| j.value().status == JourneyStatus::Active)
            .count();
        if active >= self.config.max_active_journeys {
            return Err(OrchestratorError::Journey(format!(
                "active journey limit {} reached",
                self.config.max_active_journeys
            )));
        }

        let template = self
            .templates
            .load_journey_template(template_name)
            .ok_or_else(|| OrchestratorError::Template(template_name.to_string()))?;

        let journey_id = Uuid::new_v4();
        let now = Utc::now();
        let journey = CustomerJourney {
            journey_id,
            customer_id: customer_id.to_string(),
            template_name: template_name.to_string(),
            stage: template.stage,
            status: JourneyStatus::Active,
            current_step: None,
            remaining_steps: VecDeque::from(template.steps),
            profile,
            channel_preferences,
            constraints,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        info!(
            journey_id = %journey_id,
            customer_id = %customer_id,
            template = %template_name,
            "Customer journey created"
        );
        self.journeys.insert(customer_id.to_string(), journey);
        self.emit(
            JourneyEventType::JourneyCreated,
            customer_id,
            journey_id,
            None,
            None,
            None,
            None,
        );

        self.emit(
            JourneyEventType::JourneyExecutionStarted,
            customer_id,
            journey_id,
            None,
            None,
            None,
            None,
        );
        self.schedule_next(customer_id, now, 0);

        Ok(journey_id)
    }

    pub fn pause_journey(&self, customer_id: &str) -> OrchestratorResult<()> {
        self.change_status(customer_id, JourneyStatus::Paused)?;
        Ok(())
    }

    /// Resume a paused journey, or kick a journey stalled by a step
    /// execution error back onto the queue.
    pub fn resume_journey(&self, customer_id: &str) -> OrchestratorResult<()> {
        {
            let mut journey = self
                .journeys
                .get_mut(customer_id)
                .ok_or_else(|| OrchestratorError::Journey(format!("unknown customer {}", customer_id)))?;
            match journey.status {
                JourneyStatus::Paused => {
                    journey.status = self
                        .status_machine
                        .transition(journey.status, JourneyStatus::Active)
                        .map_err(OrchestratorError::Internal)?;
                    journey.updated_at = Utc::now();
                }
                JourneyStatus::Active => {}
                other => {
                    return Err(OrchestratorError::Journey(format!(
                        "cannot resume journey in status {:?}",
                        other
                    )));
                }
            }
        }

        if !self.queue.contains_customer(customer_id) {
            self.schedule_next(customer_id, Utc::now(), 0);
        }
        Ok(())
    }

    pub fn cancel_journey(&self, customer_id: &str) -> OrchestratorResult<()> {
        let journey_id = self.change_status(customer_id, JourneyStatus::Cancelled)?;
        self.emit(
            JourneyEventType::JourneyCancelled,
            customer_id,
            journey_id,
            None,
            None,
            None,
            None,
        );
        Ok(())
    }

    fn change_status(
        &self,
        customer_id: &str,
        to: JourneyStatus,
    ) -> OrchestratorResult<Uuid> {
        let mut journey = self
            .journeys
            .get_mut(customer_id)
            .ok_or_else(|| OrchestratorError::Journey(format!("unknown customer {}", customer_id)))?;
        journey.status = self
            .status_machine
            .transition(journey.status, to)
            .map_err(OrchestratorError::Internal)?;
        journey.updated_at = Utc::now();
        Ok(journey.journey_id)
    }

    // ------------------------------------------------------------------
    // Step execution
    // ------------------------------------------------------------------

    /// Process at most one ready queue entry. Returns `None` when nothing
    /// was ready.
    pub fn process_tick(&self) -> Option<TickOutcome> {
        self.process_tick_at(Utc::now())
    }

    pub fn process_tick_at(&self, now: DateTime<Utc>) -> Option<TickOutcome> {
        let entry = self.queue.pop_ready(now)?;
        let ScheduledStep {
            customer_id, step, ..
        } = entry;

        let (journey_id, status, profile, preferences, constraints) =
            match self.journeys.get(&customer_id) {
                Some(journey) => (
                    journey.journey_id,
                    journey.status,
                    journey.profile.clone(),
                    journey.channel_preferences.clone(),
                    journey.constraints.clone(),
                ),
                None => {
                    warn!(customer_id = %customer_id, "Dropping step for unknown journey");
                    return Some(TickOutcome {
                        customer_id,
                        step_name: step.name,
                        resolution: StepResolution::Dropped,
                    });
                }
            };

        // Status gate before anything dispatches.
        match status {
            JourneyStatus::Active => {}
            JourneyStatus::Paused => {
                let until = now + Duration::seconds(self.config.defer_retry_secs as i64);
                let step_name = step.name.clone();
                self.queue.push_back(ScheduledStep {
                    customer_id: customer_id.clone(),
                    step,
                    ready_at: until,
                });
                self.emit(
                    JourneyEventType::StepDeferred,
                    &customer_id,
                    journey_id,
                    None,
                    Some(step_name.clone()),
                    None,
                    Some(serde_json::json!({ "reason": "journey_paused" })),
                );
                return Some(TickOutcome {
                    customer_id,
                    step_name,
                    resolution: StepResolution::Deferred { until },
                });
            }
            JourneyStatus::Completed | JourneyStatus::Cancelled => {
                return Some(TickOutcome {
                    customer_id,
                    step_name: step.name,
                    resolution: StepResolution::Dropped,
                });
            }
        }

        // Condition gate: all must hold, else skip without dispatch.
        if !self.evaluator.evaluate_conditions(&step.conditions, &profile) {
            let resolution = self.finish_skipped(
                &customer_id,
                journey_id,
                &step,
                "conditions_not_met",
                now,
            );
            return Some(TickOutcome {
                customer_id,
                step_name: step.name,
                resolution,
            });
        }

        let resolution = match &step.step_type {
            StepType::Message => self.execute_message(
                &customer_id,
                journey_id,
                &step,
                &profile,
                &preferences,
                &constraints,
                now,
            ),
            StepType::Wait { duration_secs } => {
                self.record_history(
                    &customer_id,
                    history_event(&step, now, StepOutcome::Waited {
                        duration_secs: *duration_secs,
                    }),
                );
                self.schedule_next(&customer_id, now, *duration_secs);
                StepResolution::WaitScheduled {
                    until: now + Duration::seconds(*duration_secs as i64),
                }
            }
            StepType::Condition { branches } => {
                match self.evaluator.choose_branch(branches, &profile) {
                    Some(target) => self.branch_to(&customer_id, journey_id, &step, target, now),
                    None => self.finish_skipped(
                        &customer_id,
                        journey_id,
                        &step,
                        "no_branch_matched",
                        now,
                    ),
                }
            }
            StepType::Split { variants } => match self.evaluator.choose_split(variants) {
                Some(target) => self.branch_to(&customer_id, journey_id, &step, target, now),
                None => self.handle_execution_error(
                    &customer_id,
                    journey_id,
                    &step,
                    "split step has no variants",
                    now,
                ),
            },
            StepType::Action { name } => {
                match self.actions.execute(name, &customer_id, &profile) {
                    Ok(()) => {
                        self.record_history(
                            &customer_id,
                            history_event(&step, now, StepOutcome::ActionInvoked {
                                action: name.clone(),
                            }),
                        );
                        self.schedule_next(&customer_id, now, 0);
                        StepResolution::ActionInvoked
                    }
                    Err(e) => self.handle_execution_error(
                        &customer_id,
                        journey_id,
                        &step,
                        &e.to_string(),
                        now,
                    ),
                }
            }
        };

        Some(TickOutcome {
            customer_id,
            step_name: step.name,
            resolution,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_message(
        &self,
        customer_id: &str,
        journey_id: Uuid,
        step: &JourneyStep,
        profile: &CustomerProfile,
        preferences: &HashMap<String, ChannelPreference>,
        constraints: &CustomerConstraints,
        now: DateTime<Utc>,
    ) -> StepResolution {
        let channel_id = match step.channel.as_deref() {
            Some(c) => c,
            None => {
                return self.handle_execution_error(
                    customer_id,
                    journey_id,
                    step,
                    "message step has no target channel",
                    now,
                );
            }
        };

        let channel = match self.registry.get_channel(channel_id) {
            Some(c) => c,
            None => {
                return self.handle_execution_error(
                    customer_id,
                    journey_id,
                    step,
                    &format!("unknown channel {}", channel_id),
                    now,
                );
            }
        };
        if !channel.active {
            return self.handle_execution_error(
                customer_id,
                journey_id,
                step,
                &format!("channel {} is deactivated", channel_id),
                now,
            );
        }

        // Policy: blocked preference or customer constraint skips without
        // touching send history.
        let preference = preferences.get(channel_id);
        let blocked = constraints.forbids(channel_id)
            || preference.map(|p| p.is_blocked()).unwrap_or(false);
        if blocked {
            return self.finish_skipped(customer_id, journey_id, step, "channel_blocked", now);
        }

        // Outside the preference window: reschedule for the next one
        // rather than drop.
        if let Some(preference) = preference {
            if !preference.permits_at(now) {
                let until = next_window_start(now, &preference.windows)
                    .unwrap_or(now + Duration::seconds(self.config.defer_retry_secs as i64));
                return self.defer_step(
                    customer_id,
                    journey_id,
                    step,
                    until,
                    "outside_time_window",
                    None,
                );
            }
        }

        // Frequency capping: defer-and-retry, never bypass.
        if let Some(rule) =
            self.capping
                .blocking_rule_at(customer_id, channel_id, profile, now)
        {
            let until = now + Duration::seconds(self.config.defer_retry_secs as i64);
            return self.defer_step(
                customer_id,
                journey_id,
                step,
                until,
                "frequency_cap",
                Some(rule),
            );
        }

        let content = step.content.clone().unwrap_or_default();
        let body = self.personalizer.personalize(&content, profile);

        match self.gateway.deliver(channel_id, customer_id, &body) {
            Ok(message_id) => {
                self.capping.record_send_at(customer_id, channel_id, now);
                self.registry.record_send(channel_id);
                self.record_history(
                    customer_id,
                    JourneyHistoryEvent {
                        timestamp: now,
                        step_id: step.id,
                        step_name: step.name.clone(),
                        channel: Some(channel_id.to_string()),
                        content: Some(body),
                        message_id: Some(message_id.clone()),
                        outcome: StepOutcome::Sent,
                        engagement: None,
                        attribution: None,
                    },
                );
                metrics::counter!("journey.messages_sent", "channel" => channel_id.to_string())
                    .increment(1);
                self.emit(
                    JourneyEventType::MessageSent,
                    customer_id,
                    journey_id,
                    Some(channel_id.to_string()),
                    Some(step.name.clone()),
                    Some(message_id.clone()),
                    None,
                );
                self.schedule_next(customer_id, now, 0);
                StepResolution::MessageSent { message_id }
            }
            Err(e) => self.handle_execution_error(
                customer_id,
                journey_id,
                step,
                &e.to_string(),
                now,
            ),
        }
    }

    /// Skip the step (policy or condition outcome), record it, and move on.
    fn finish_skipped(
        &self,
        customer_id: &str,
        journey_id: Uuid,
        step: &JourneyStep,
        reason: &str,
        now: DateTime<Utc>,
    ) -> StepResolution {
        self.record_history(
            customer_id,
            history_event(step, now, StepOutcome::Skipped {
                reason: reason.to_string(),
            }),
        );
        self.emit(
            JourneyEventType::StepSkipped,
            customer_id,
            journey_id,
            step.channel.clone(),
            Some(step.name.clone()),
            None,
            Some(serde_json::json!({ "reason": reason })),
        );
        self.schedule_next(customer_id, now, 0);
        StepResolution::Skipped {
            reason: reason.to_string(),
        }
    }

    /// Re-enqueue the same step for later; the journey does not advance.
    fn defer_step(
        &self,
        customer_id: &str,
        journey_id: Uuid,
        step: &JourneyStep,
        until: DateTime<Utc>,
        reason: &str,
        rule: Option<String>,
    ) -> StepResolution {
        self.queue.push_back(ScheduledStep {
            customer_id: customer_id.to_string(),
            step: step.clone(),
            ready_at: until,
        });
        self.emit(
            JourneyEventType::StepDeferred,
            customer_id,
            journey_id,
            step.channel.clone(),
            Some(step.name.clone()),
            None,
            Some(serde_json::json!({ "reason": reason, "rule": rule, "retry_at": until })),
        );
        StepResolution::Deferred { until }
    }

    /// Fail-soft error path: first fallback step re-enters at the queue
    /// front, otherwise the journey halts until externally resumed.
    fn handle_execution_error(
        &self,
        customer_id: &str,
        journey_id: Uuid,
        step: &JourneyStep,
        error: &str,
        now: DateTime<Utc>,
    ) -> StepResolution {
        warn!(
            customer_id = %customer_id,
            step = %step.name,
            error = %error,
            "Step execution error"
        );
        metrics::counter!("journey.step_errors").increment(1);

        self.record_history(
            customer_id,
            history_event(step, now, StepOutcome::Failed {
                error: error.to_string(),
            }),
        );

        let fallback = step.fallback_steps.first().cloned();
        let detail = serde_json::json!({
            "error": error,
            "fallback": fallback.as_ref().map(|f| f.name.clone()),
        });
        self.emit(
            JourneyEventType::StepExecutionError,
            customer_id,
            journey_id,
            step.channel.clone(),
            Some(step.name.clone()),
            None,
            Some(detail),
        );

        if let Some(fallback) = fallback {
            self.queue.push_front(ScheduledStep {
                customer_id: customer_id.to_string(),
                step: fallback,
                ready_at: now,
            });
        }

        StepResolution::Failed {
            error: error.to_string(),
        }
    }

    /// Fast-forward the remaining-step list to a branch target and queue
    /// it. A missing target ends the journey with an error event.
    fn branch_to(
        &self,
        customer_id: &str,
        journey_id: Uuid,
        step: &JourneyStep,
        target: Uuid,
        now: DateTime<Utc>,
    ) -> StepResolution {
        let found = {
            let mut journey = match self.journeys.get_mut(customer_id) {
                Some(j) => j,
                None => return StepResolution::Dropped,
            };
            while let Some(front) = journey.remaining_steps.front() {
                if front.id == target {
                    break;
                }
                journey.remaining_steps.pop_front();
            }
            journey.remaining_steps.front().is_some()
        };

        if !found {
            self.emit(
                JourneyEventType::StepExecutionError,
                customer_id,
                journey_id,
                None,
                Some(step.name.clone()),
                None,
                Some(serde_json::json!({ "error": format!("branch target {} not found", target) })),
            );
            self.complete_journey(customer_id, now);
            return StepResolution::Failed {
                error: format!("branch target {} not found", target),
            };
        }

        self.record_history(
            customer_id,
            history_event(step, now, StepOutcome::Branched {
                target_step: target,
            }),
        );
        self.schedule_next(customer_id, now, 0);
        StepResolution::Branched {
            target_step: target,
        }
    }

    /// Queue the next remaining step, or complete the journey when none
    /// remain.
    fn schedule_next(&self, customer_id: &str, now: DateTime<Utc>, extra_delay_secs: u64) {
        let next = {
            let mut journey = match self.journeys.get_mut(customer_id) {
                Some(j) => j,
                None => return,
            };
            let next = journey.remaining_steps.pop_front();
            if let Some(step) = &next {
                journey.current_step = Some(step.id);
                journey.updated_at = now;
            }
            next
        };

        match next {
            Some(step) => {
                let delay = extra_delay_secs + step.timing.delay_secs;
                self.queue.push_back(ScheduledStep {
                    customer_id: customer_id.to_string(),
                    step,
                    ready_at: now + Duration::seconds(delay as i64),
                });
            }
            None => self.complete_journey(customer_id, now),
        }
    }

    fn complete_journey(&self, customer_id: &str, now: DateTime<Utc>) {
        let journey_id = {
            let mut journey = match self.journeys.get_mut(customer_id) {
                Some(j) => j,
                None => return,
            };
            if self
                .status_machine
                .can_transition(journey.status, JourneyStatus::Completed)
            {
                journey.status = JourneyStatus::Completed;
            }
            journey.current_step = None;
            journey.updated_at = now;
            journey.journey_id
        };

        info!(customer_id = %customer_id, journey_id = %journey_id, "Journey completed");
        self.emit(
            JourneyEventType::JourneyCompleted,
            customer_id,
            journey_id,
            None,
            None,
            None,
            None,
        );
    }

    fn record_history(&self, customer_id: &str, event: JourneyHistoryEvent) {
        if let Some(mut journey) = self.journeys.get_mut(customer_id) {
            journey.history.push(event);
            journey.updated_at = Utc::now();
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        event_type: JourneyEventType,
        customer_id: &str,
        journey_id: Uuid,
        channel: Option<String>,
        step: Option<String>,
        message_id: Option<String>,
        detail: Option<serde_json::Value>,
    ) {
        self.event_sink.emit(OrchestrationEvent {
            journey_id: Some(journey_id),
            step,
            message_id,
            ..make_event(event_type, Some(customer_id.to_string()), channel, detail)
        });
    }

    // ------------------------------------------------------------------
    // Attribution and personalization facades
    // ------------------------------------------------------------------

    pub fn record_attribution(
        &self,
        customer_id: &str,
        touchpoint: Touchpoint,
        conversion_value: Option<f64>,
    ) {
        self.attribution
            .record_touchpoint(customer_id, touchpoint, conversion_value);
    }

    pub fn get_attribution_data(&self, customer_id: &str) -> Option<AttributionRecord> {
        self.attribution.get(customer_id)
    }

    pub fn generate_real_time_personalization(
        &self,
        customer_id: &str,
        context: &HashMap<String, serde_json::Value>,
    ) -> Personalization {
        let profile = self
            .journeys
            .get(customer_id)
            .map(|j| j.profile.clone())
            .unwrap_or_default();
        self.realtime.generate(customer_id, &profile, context)
    }

    /// Recompute stale cached personalization for every active journey.
    pub fn refresh_personalization(&self, max_age: Duration) {
        let context = HashMap::new();
        for entry in self.journeys.iter() {
            let journey = entry.value();
            if journey.status == JourneyStatus::Active {
                self.realtime
                    .refresh(&journey.customer_id, &journey.profile, &context, max_age);
            }
        }
    }

    /// Prune capping history older than the retention horizon.
    pub fn run_cleanup(&self, retention_hours: i64) -> usize {
        let cutoff = Utc::now() - Duration::hours(retention_hours);
        let removed = self.capping.prune_history(cutoff);
        if removed > 0 {
            info!(removed, "Pruned stale send history");
        }
        removed
    }

    // ------------------------------------------------------------------
    // Read-only projections
    // ------------------------------------------------------------------

    pub fn get_customer_journey(&self, customer_id: &str) -> Option<CustomerJourney> {
        self.journeys.get(customer_id).map(|j| j.clone())
    }

    pub fn all_journeys(&self) -> Vec<CustomerJourney> {
        self.journeys.iter().map(|j| j.value().clone()).collect()
    }

    pub fn queued_steps(&self) -> usize {
        self.queue.len()
    }

    pub fn omnichannel_metrics(&self) -> OmnichannelMetrics {
        let mut counts = JourneyCounts::default();
        for entry in self.journeys.iter() {
            counts.total += 1;
            match entry.value().status {
                JourneyStatus::Active => counts.active += 1,
                JourneyStatus::Paused => counts.paused += 1,
                JourneyStatus::Completed => counts.completed += 1,
                JourneyStatus::Cancelled => counts.cancelled += 1,
            }
        }

        let channels = self
            .registry
            .all_channels()
            .into_iter()
            .map(|c| ChannelSummary {
                channel_id: c.id,
                sends: c.performance.sends,
                delivery_rate: c.performance.delivery_rate,
                open_rate: c.performance.open_rate,
                click_rate: c.performance.click_rate,
                conversion_rate: c.performance.conversion_rate,
            })
            .collect();

        let attribution = AttributionSummary {
            customers_tracked: self.attribution.customers_tracked() as u64,
            conversions: self.attribution.conversions() as u64,
            total_conversion_value: self.attribution.total_conversion_value(),
        };

        OmnichannelMetrics::new(counts, channels, attribution)
    }
}

fn history_event(step: &JourneyStep, now: DateTime<Utc>, outcome: StepOutcome) -> JourneyHistoryEvent {
    JourneyHistoryEvent {
        timestamp: now,
        step_id: step.id,
        step_name: step.name.clone(),
        channel: step.channel.clone(),
        content: None,
        message_id: None,
        outcome,
        engagement: None,
        attribution: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnijourney_channels::InMemoryGateway;
    use omnijourney_core::conditions::{ComparisonOperator, Condition};
    use omnijourney_core::event_bus::{capture_sink, CaptureSink};
    use omnijourney_delivery::{CappingScope, FrequencyRule};
    use omnijourney_personalization::MessageContent;
    use crate::types::{
        ConditionBranch, InMemoryTemplateStore, JourneyStage, JourneyTemplate, SplitVariant,
    };
    use serde_json::json;

    struct Fixture {
        orchestrator: JourneyOrchestrator,
        gateway: Arc<InMemoryGateway>,
        sink: Arc<CaptureSink>,
        templates: Arc<InMemoryTemplateStore>,
        capping: Arc<FrequencyCapEngine>,
    }

    fn fixture_with_rules(rules: Vec<FrequencyRule>) -> Fixture {
        let registry = Arc::new(ChannelRegistry::new());
        registry.seed_default_channels();
        let capping = Arc::new(FrequencyCapEngine::new(rules));
        let gateway = Arc::new(InMemoryGateway::new());
        let templates = Arc::new(InMemoryTemplateStore::new());
        let sink = capture_sink();

        let orchestrator = JourneyOrchestrator::new(
            registry,
            capping.clone(),
            gateway.clone(),
            templates.clone(),
        )
        .with_event_sink(sink.clone())
        .with_attribution(Arc::new(
            AttributionEngine::new().with_event_sink(sink.clone()),
        ));

        Fixture {
            orchestrator,
            gateway,
            sink,
            templates,
            capping,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_rules(Vec::new())
    }

    fn two_message_template() -> JourneyTemplate {
        JourneyTemplate {
            name: "onboarding".to_string(),
            description: "two-touch onboarding".to_string(),
            stage: JourneyStage::Awareness,
            steps: vec![
                JourneyStep::message(
                    "hello_email",
                    "email",
                    MessageContent::from_template("Hi {{first_name}}"),
                ),
                JourneyStep::message(
                    "nudge_push",
                    "push",
                    MessageContent::from_template("Still there, {{first_name}}?"),
                ),
            ],
        }
    }

    fn profile_named(name: &str) -> CustomerProfile {
        let mut profile = CustomerProfile::default();
        profile.demographics.insert("first_name".into(), json!(name));
        profile
    }

    fn drain(orchestrator: &JourneyOrchestrator, now: DateTime<Utc>) -> Vec<TickOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = orchestrator.process_tick_at(now) {
            outcomes.push(outcome);
        }
        outcomes
    }

    #[test]
    fn test_unknown_template_fails_creation() {
        let f = fixture();
        let result = f.orchestrator.create_customer_journey(
            "cust_1",
            "nonexistent",
            CustomerProfile::default(),
            HashMap::new(),
            CustomerConstraints::default(),
        );
        assert!(matches!(result, Err(OrchestratorError::Template(_))));
        assert!(f.orchestrator.get_customer_journey("cust_1").is_none());
    }

    #[test]
    fn test_one_active_journey_per_customer() {
        let f = fixture();
        f.templates.insert(two_message_template());

        f.orchestrator
            .create_customer_journey(
                "cust_1",
                "onboarding",
                CustomerProfile::default(),
                HashMap::new(),
                CustomerConstraints::default(),
            )
            .unwrap();
        let second = f.orchestrator.create_customer_journey(
            "cust_1",
            "onboarding",
            CustomerProfile::default(),
            HashMap::new(),
            CustomerConstraints::default(),
        );
        assert!(matches!(second, Err(OrchestratorError::Journey(_))));
    }

    #[test]
    fn test_happy_path_runs_to_completion() {
        let f = fixture();
        f.templates.insert(two_message_template());

        f.orchestrator
            .create_customer_journey(
                "cust_1",
                "onboarding",
                profile_named("Ana"),
                HashMap::new(),
                CustomerConstraints::default(),
            )
            .unwrap();

        let outcomes = drain(&f.orchestrator, Utc::now());
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            outcomes[0].resolution,
            StepResolution::MessageSent { .. }
        ));
        assert!(matches!(
            outcomes[1].resolution,
            StepResolution::MessageSent { .. }
        ));

        let journey = f.orchestrator.get_customer_journey("cust_1").unwrap();
        assert_eq!(journey.status, JourneyStatus::Completed);
        assert_eq!(journey.history.len(), 2);
        assert_eq!(journey.history[0].outcome, StepOutcome::Sent);

        let messages = f.gateway.messages_for("cust_1");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body, "Hi Ana");

        // Events in deterministic order.
        let types: Vec<JourneyEventType> =
            f.sink.events().iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                JourneyEventType::JourneyCreated,
                JourneyEventType::JourneyExecutionStarted,
                JourneyEventType::MessageSent,
                JourneyEventType::MessageSent,
                JourneyEventType::JourneyCompleted,
            ]
        );
    }

    #[test]
    fn test_condition_and_semantics_gate_dispatch() {
        let f = fixture();
        let mut template = two_message_template();
        template.steps[0].conditions = vec![
            Condition {
                field: "visits".into(),
                operator: ComparisonOperator::GreaterThan,
                value: json!(5),
            },
            Condition {
                field: "country".into(),
                operator: ComparisonOperator::Equals,
                value: json!("ES"),
            },
        ];
        f.templates.insert(template);

        let mut profile = profile_named("Ana");
        profile.behavioral.insert("visits".into(), json!(10));
        profile.behavioral.insert("country".into(), json!("PT"));

        f.orchestrator
            .create_customer_journey(
                "cust_1",
                "onboarding",
                profile,
                HashMap::new(),
                CustomerConstraints::default(),
            )
            .unwrap();

        let outcomes = drain(&f.orchestrator, Utc::now());
        assert_eq!(
            outcomes[0].resolution,
            StepResolution::Skipped {
                reason: "conditions_not_met".into()
            }
        );
        // The second step still dispatches.
        assert!(matches!(
            outcomes[1].resolution,
            StepResolution::MessageSent { .. }
        ));
        assert_eq!(f.sink.count_type(JourneyEventType::StepSkipped), 1);
        assert_eq!(f.sink.count_type(JourneyEventType::MessageSent), 1);
    }

    #[test]
    fn test_frequency_cap_defers_and_retries() {
        let rule = FrequencyRule {
            id: Uuid::new_v4(),
            name: "email_daily".to_string(),
            scope: CappingScope::Channel,
            time_window_hours: 24,
            max_exposures: 1,
            channels: vec!["email".to_string()],
            priority: 5,
            exceptions: Vec::new(),
        };
        let f = fixture_with_rules(vec![rule]);
        f.templates.insert(two_message_template());

        // Exhaust the cap before the journey runs.
        f.capping
            .record_send_at("cust_1", "email", Utc::now() - Duration::hours(1));

        f.orchestrator
            .create_customer_journey(
                "cust_1",
                "onboarding",
                profile_named("Ana"),
                HashMap::new(),
                CustomerConstraints::default(),
            )
            .unwrap();

        let now = Utc::now();
        let outcome = f.orchestrator.process_tick_at(now).unwrap();
        assert!(matches!(outcome.resolution, StepResolution::Deferred { .. }));
        assert_eq!(f.sink.count_type(JourneyEventType::StepDeferred), 1);
        assert!(f.gateway.messages_for("cust_1").is_empty());
        // The step is parked, not lost.
        assert_eq!(f.orchestrator.queued_steps(), 1);

        // Once the window rolls, the retry dispatches.
        let later = now + Duration::hours(25);
        let outcome = f.orchestrator.process_tick_at(later).unwrap();
        assert!(matches!(
            outcome.resolution,
            StepResolution::MessageSent { .. }
        ));
    }

    #[test]
    fn test_gateway_failure_uses_fallback_step() {
        let f = fixture();
        let mut template = two_message_template();
        template.steps[0].fallback_steps = vec![JourneyStep::message(
            "hello_sms_fallback",
            "sms",
            MessageContent::from_template("Hi {{first_name}} (sms)"),
        )];
        f.templates.insert(template);
        f.gateway.fail_channel("email");

        f.orchestrator
            .create_customer_journey(
                "cust_1",
                "onboarding",
                profile_named("Ana"),
                HashMap::new(),
                CustomerConstraints::default(),
            )
            .unwrap();

        let now = Utc::now();
        let first = f.orchestrator.process_tick_at(now).unwrap();
        assert!(matches!(first.resolution, StepResolution::Failed { .. }));
        assert_eq!(f.sink.count_type(JourneyEventType::StepExecutionError), 1);

        // The fallback runs before the rest of the queue.
        let second = f.orchestrator.process_tick_at(now).unwrap();
        assert_eq!(second.step_name, "hello_sms_fallback");
        assert!(matches!(
            second.resolution,
            StepResolution::MessageSent { .. }
        ));
        assert_eq!(f.gateway.messages_for("cust_1")[0].channel_id, "sms");
    }

    #[test]
    fn test_gateway_failure_without_fallback_halts_until_resumed() {
        let f = fixture();
        f.templates.insert(two_message_template());
        f.gateway.fail_channel("email");

        f.orchestrator
            .create_customer_journey(
                "cust_1",
                "onboarding",
                profile_named("Ana"),
                HashMap::new(),
                CustomerConstraints::default(),
            )
            .unwrap();

        let now = Utc::now();
        let outcome = f.orchestrator.process_tick_at(now).unwrap();
        assert!(matches!(outcome.resolution, StepResolution::Failed { .. }));
        // Halted: nothing further is queued.
        assert_eq!(f.orchestrator.queued_steps(), 0);
        let journey = f.orchestrator.get_customer_journey("cust_1").unwrap();
        assert_eq!(journey.status, JourneyStatus::Active);

        // External resume re-enters at the next remaining step.
        f.orchestrator.resume_journey("cust_1").unwrap();
        let outcome = f
            .orchestrator
            .process_tick_at(now + Duration::minutes(1))
            .unwrap();
        assert_eq!(outcome.step_name, "nudge_push");
        assert!(matches!(
            outcome.resolution,
            StepResolution::MessageSent { .. }
        ));
    }

    #[test]
    fn test_wait_step_delays_next() {
        let f = fixture();
        let template = JourneyTemplate {
            name: "onboarding".to_string(),
            description: String::new(),
            stage: JourneyStage::Awareness,
            steps: vec![
                JourneyStep::wait("cool_off", 3600),
                JourneyStep::message(
                    "later_email",
                    "email",
                    MessageContent::from_template("Welcome back"),
                ),
            ],
        };
        f.templates.insert(template);

        f.orchestrator
            .create_customer_journey(
                "cust_1",
                "onboarding",
                CustomerProfile::default(),
                HashMap::new(),
                CustomerConstraints::default(),
            )
            .unwrap();

        let now = Utc::now();
        let outcome = f.orchestrator.process_tick_at(now).unwrap();
        assert!(matches!(
            outcome.resolution,
            StepResolution::WaitScheduled { .. }
        ));

        // Not ready one minute later; ready after the hour elapses.
        assert!(f.orchestrator.process_tick_at(now + Duration::minutes(1)).is_none());
        let outcome = f
            .orchestrator
            .process_tick_at(now + Duration::hours(1) + Duration::seconds(1))
            .unwrap();
        assert!(matches!(
            outcome.resolution,
            StepResolution::MessageSent { .. }
        ));
    }

    #[test]
    fn test_condition_step_branches_and_fast_forwards() {
        let f = fixture();
        let target = JourneyStep::message(
            "vip_email",
            "email",
            MessageContent::from_template("VIP offer"),
        );
        let skipped_over = JourneyStep::message(
            "regular_email",
            "email",
            MessageContent::from_template("Regular offer"),
        );
        let branch_step = JourneyStep {
            id: Uuid::new_v4(),
            name: "tier_gate".to_string(),
            step_type: StepType::Condition {
                branches: vec![ConditionBranch {
                    condition: Condition {
                        field: "tier".into(),
                        operator: ComparisonOperator::Equals,
                        value: json!("vip"),
                    },
                    target_step: target.id,
                }],
            },
            channel: None,
            content: None,
            timing: Default::default(),
            conditions: Vec::new(),
            priority: 5,
            fallback_steps: Vec::new(),
        };
        f.templates.insert(JourneyTemplate {
            name: "branching".to_string(),
            description: String::new(),
            stage: JourneyStage::Conversion,
            steps: vec![branch_step, skipped_over, target],
        });

        let mut profile = CustomerProfile::default();
        profile.behavioral.insert("tier".into(), json!("vip"));

        f.orchestrator
            .create_customer_journey(
                "cust_1",
                "branching",
                profile,
                HashMap::new(),
                CustomerConstraints::default(),
            )
            .unwrap();

        let outcomes = drain(&f.orchestrator, Utc::now());
        assert!(matches!(
            outcomes[0].resolution,
            StepResolution::Branched { .. }
        ));
        assert_eq!(outcomes[1].step_name, "vip_email");
        // The intermediate step never ran.
        assert_eq!(f.gateway.messages_for("cust_1").len(), 1);
        assert_eq!(f.gateway.messages_for("cust_1")[0].body, "VIP offer");
    }

    #[test]
    fn test_split_step_selects_weighted_branch() {
        let f = fixture();
        let target = JourneyStep::message(
            "variant_a_email",
            "email",
            MessageContent::from_template("Variant A"),
        );
        let split_step = JourneyStep {
            id: Uuid::new_v4(),
            name: "ab_split".to_string(),
            step_type: StepType::Split {
                variants: vec![SplitVariant {
                    name: "a".into(),
                    weight: 1.0,
                    target_step: target.id,
                }],
            },
            channel: None,
            content: None,
            timing: Default::default(),
            conditions: Vec::new(),
            priority: 5,
            fallback_steps: Vec::new(),
        };
        f.templates.insert(JourneyTemplate {
            name: "split".to_string(),
            description: String::new(),
            stage: JourneyStage::Consideration,
            steps: vec![split_step, target],
        });

        f.orchestrator
            .create_customer_journey(
                "cust_1",
                "split",
                CustomerProfile::default(),
                HashMap::new(),
                CustomerConstraints::default(),
            )
            .unwrap();

        let outcomes = drain(&f.orchestrator, Utc::now());
        assert!(matches!(
            outcomes[0].resolution,
            StepResolution::Branched { .. }
        ));
        assert_eq!(outcomes[1].step_name, "variant_a_email");
    }

    #[test]
    fn test_action_step_invokes_handler() {
        struct RecordingHandler(std::sync::Mutex<Vec<String>>);
        impl ActionHandler for RecordingHandler {
            fn execute(
                &self,
                action: &str,
                _customer_id: &str,
                _profile: &CustomerProfile,
            ) -> OrchestratorResult<()> {
                self.0.lock().unwrap().push(action.to_string());
                Ok(())
            }
        }

        let registry = Arc::new(ChannelRegistry::new());
        registry.seed_default_channels();
        let handler = Arc::new(RecordingHandler(std::sync::Mutex::new(Vec::new())));
        let templates = Arc::new(InMemoryTemplateStore::new());
        templates.insert(JourneyTemplate {
            name: "crm".to_string(),
            description: String::new(),
            stage: JourneyStage::Retention,
            steps: vec![JourneyStep::action("sync_crm", "update_crm_record")],
        });

        let orchestrator = JourneyOrchestrator::new(
            registry,
            Arc::new(FrequencyCapEngine::new(Vec::new())),
            Arc::new(InMemoryGateway::new()),
            templates,
        )
        .with_action_handler(handler.clone());

        orchestrator
            .create_customer_journey(
                "cust_1",
                "crm",
                CustomerProfile::default(),
                HashMap::new(),
                CustomerConstraints::default(),
            )
            .unwrap();

        let outcome = orchestrator.process_tick().unwrap();
        assert_eq!(outcome.resolution, StepResolution::ActionInvoked);
        assert_eq!(handler.0.lock().unwrap().as_slice(), ["update_crm_record"]);
    }

    #[test]
    fn test_pause_defers_and_cancel_drops() {
        let f = fixture();
        f.templates.insert(two_message_template());

        f.orchestrator
            .create_customer_journey(
                "cust_1",
                "onboarding",
                profile_named("Ana"),
                HashMap::new(),
                CustomerConstraints::default(),
            )
            .unwrap();

        f.orchestrator.pause_journey("cust_1").unwrap();
        let now = Utc::now();
        let outcome = f.orchestrator.process_tick_at(now).unwrap();
        assert!(matches!(outcome.resolution, StepResolution::Deferred { .. }));
        assert!(f.gateway.messages_for("cust_1").is_empty());

        f.orchestrator.cancel_journey("cust_1").unwrap();
        assert_eq!(f.sink.count_type(JourneyEventType::JourneyCancelled), 1);

        // The deferred entry is dropped when it comes due.
        let outcome = f
            .orchestrator
            .process_tick_at(now + Duration::hours(1))
            .unwrap();
        assert_eq!(outcome.resolution, StepResolution::Dropped);
        assert!(f.gateway.messages_for("cust_1").is_empty());
    }

    #[test]
    fn test_metrics_projection() {
        let f = fixture();
        f.templates.insert(two_message_template());

        f.orchestrator
            .create_customer_journey(
                "cust_1",
                "onboarding",
                profile_named("Ana"),
                HashMap::new(),
                CustomerConstraints::default(),
            )
            .unwrap();
        drain(&f.orchestrator, Utc::now());

        f.orchestrator.record_attribution(
            "cust_1",
            Touchpoint {
                channel: "email".into(),
                timestamp: Utc::now(),
                value: 0.0,
            },
            Some(42.0),
        );

        let metrics = f.orchestrator.omnichannel_metrics();
        assert_eq!(metrics.journeys.total, 1);
        assert_eq!(metrics.journeys.completed, 1);
        assert_eq!(metrics.messages_sent_by_channel["email"], 1);
        assert_eq!(metrics.messages_sent_by_channel["push"], 1);
        assert_eq!(metrics.attribution.conversions, 1);
        assert!((metrics.attribution.total_conversion_value - 42.0).abs() < 1e-9);
    }
}
