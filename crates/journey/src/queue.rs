//! Processing queue — steps ready (or scheduled) to execute, drained one
//! entry per scheduler tick.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::types::JourneyStep;

/// A step queued for a customer, ready to run at `ready_at`.
#[derive(Debug, Clone)]
pub struct ScheduledStep {
    pub customer_id: String,
    pub step: JourneyStep,
    pub ready_at: DateTime<Utc>,
}

/// FIFO queue with time gating. Deferred entries (waits, capping retries,
/// window reschedules) sit in place until their `ready_at` passes; order
/// among ready entries is preserved.
pub struct StepQueue {
    inner: Mutex<VecDeque<ScheduledStep>>,
}

impl StepQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_back(&self, entry: ScheduledStep) {
        self.inner.lock().push_back(entry);
    }

    /// Fallback steps re-enter at the front so they run before anything
    /// else already queued.
    pub fn push_front(&self, entry: ScheduledStep) {
        self.inner.lock().push_front(entry);
    }

    /// Remove and return the first entry whose `ready_at` has passed.
    pub fn pop_ready(&self, now: DateTime<Utc>) -> Option<ScheduledStep> {
        let mut queue = self.inner.lock();
        let index = queue.iter().position(|e| e.ready_at <= now)?;
        queue.remove(index)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn contains_customer(&self, customer_id: &str) -> bool {
        self.inner
            .lock()
            .iter()
            .any(|e| e.customer_id == customer_id)
    }

    /// Earliest `ready_at` across queued entries.
    pub fn next_ready_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().iter().map(|e| e.ready_at).min()
    }
}

impl Default for StepQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(customer: &str, ready_at: DateTime<Utc>) -> ScheduledStep {
        ScheduledStep {
            customer_id: customer.to_string(),
            step: JourneyStep::wait("noop", 0),
            ready_at,
        }
    }

    #[test]
    fn test_fifo_among_ready() {
        let queue = StepQueue::new();
        let now = Utc::now();
        queue.push_back(entry("a", now - Duration::seconds(10)));
        queue.push_back(entry("b", now - Duration::seconds(5)));

        assert_eq!(queue.pop_ready(now).unwrap().customer_id, "a");
        assert_eq!(queue.pop_ready(now).unwrap().customer_id, "b");
        assert!(queue.pop_ready(now).is_none());
    }

    #[test]
    fn test_future_entries_skipped() {
        let queue = StepQueue::new();
        let now = Utc::now();
        queue.push_back(entry("later", now + Duration::hours(1)));
        queue.push_back(entry("ready", now));

        // The deferred head is skipped, not dropped.
        assert_eq!(queue.pop_ready(now).unwrap().customer_id, "ready");
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_ready(now).is_none());
        assert_eq!(
            queue.pop_ready(now + Duration::hours(2)).unwrap().customer_id,
            "later"
        );
    }

    #[test]
    fn test_push_front_runs_first() {
        let queue = StepQueue::new();
        let now = Utc::now();
        queue.push_back(entry("second", now));
        queue.push_front(entry("first", now));

        assert_eq!(queue.pop_ready(now).unwrap().customer_id, "first");
    }

    #[test]
    fn test_contains_customer() {
        let queue = StepQueue::new();
        queue.push_back(entry("a", Utc::now()));
        assert!(queue.contains_customer("a"));
        assert!(!queue.contains_customer("b"));
    }
}
