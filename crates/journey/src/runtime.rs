//! Cooperative scheduler — fixed-tick loops driving the orchestrator.
//!
//! One queued step per step tick, personalization refresh on a longer
//! tick, and stale-history cleanup on the hourly tick. All waiting is
//! re-enqueue-later; nothing blocks the tick task.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use omnijourney_core::config::SchedulerConfig;

use crate::orchestrator::JourneyOrchestrator;

pub struct OrchestratorRuntime {
    orchestrator: Arc<JourneyOrchestrator>,
    config: SchedulerConfig,
}

impl OrchestratorRuntime {
    pub fn new(orchestrator: Arc<JourneyOrchestrator>, config: SchedulerConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Run the tick loops until the task is aborted.
    pub async fn run(self) {
        info!(
            step_tick_ms = self.config.step_tick_ms,
            personalization_refresh_ms = self.config.personalization_refresh_ms,
            cleanup_interval_secs = self.config.cleanup_interval_secs,
            "Orchestrator runtime started"
        );

        let mut step_tick = tokio::time::interval(Duration::from_millis(self.config.step_tick_ms));
        let mut refresh_tick =
            tokio::time::interval(Duration::from_millis(self.config.personalization_refresh_ms));
        let mut cleanup_tick =
            tokio::time::interval(Duration::from_secs(self.config.cleanup_interval_secs));
        let refresh_age = chrono::Duration::milliseconds(
            self.config.personalization_refresh_ms as i64,
        );

        loop {
            tokio::select! {
                _ = step_tick.tick() => {
                    self.orchestrator.process_tick();
                }
                _ = refresh_tick.tick() => {
                    self.orchestrator.refresh_personalization(refresh_age);
                }
                _ = cleanup_tick.tick() => {
                    self.orchestrator.run_cleanup(self.config.history_retention_hours);
                }
            }
        }
    }
}
