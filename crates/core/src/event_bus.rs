//! Unified event bus — trait for emitting orchestration lifecycle events.
//!
//! Engines accept an `Arc<dyn EventSink>` and emit synchronously, after
//! mutating state and before returning, so consumers observe a
//! deterministic event order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Lifecycle events observable by external logging/monitoring collaborators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JourneyEventType {
    ChannelsInitialized,
    JourneyCreated,
    JourneyExecutionStarted,
    MessageSent,
    StepSkipped,
    StepDeferred,
    StepExecutionError,
    JourneyCompleted,
    JourneyCancelled,
    AttributionRecorded,
    AttributionCalculated,
    RealTimePersonalizationGenerated,
}

/// An emitted orchestration event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationEvent {
    pub event_id: Uuid,
    pub event_type: JourneyEventType,
    pub customer_id: Option<String>,
    pub journey_id: Option<Uuid>,
    pub channel: Option<String>,
    pub step: Option<String>,
    pub message_id: Option<String>,
    pub detail: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Trait for emitting orchestration events. Implementations route events to
/// log pipelines, monitoring, or test capture buffers.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OrchestrationEvent);
}

/// No-op sink for modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: OrchestrationEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<OrchestrationEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<OrchestrationEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn count_type(&self, event_type: JourneyEventType) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event bus mutex poisoned").clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: OrchestrationEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Convenience builder for `OrchestrationEvent` with minimal boilerplate.
/// Callers fill journey/step/message fields with struct update syntax.
pub fn make_event(
    event_type: JourneyEventType,
    customer_id: Option<String>,
    channel: Option<String>,
    detail: Option<serde_json::Value>,
) -> OrchestrationEvent {
    OrchestrationEvent {
        event_id: Uuid::new_v4(),
        event_type,
        customer_id,
        journey_id: None,
        channel,
        step: None,
        message_id: None,
        detail,
        timestamp: Utc::now(),
    }
}

/// Convenience: create a no-op event bus for modules that don't need it.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
