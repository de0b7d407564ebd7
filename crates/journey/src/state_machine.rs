use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::types::JourneyStatus;

/// Describes a single valid status transition for a customer journey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: JourneyStatus,
    pub to: JourneyStatus,
    pub trigger: String,
}

/// Guards journey lifecycle by enforcing a finite set of valid status
/// transitions. Completed and cancelled are terminal.
#[derive(Debug, Clone)]
pub struct JourneyStatusMachine {
    transitions: Vec<StatusTransition>,
}

impl JourneyStatusMachine {
    pub fn new() -> Self {
        let transitions = vec![
            StatusTransition {
                from: JourneyStatus::Active,
                to: JourneyStatus::Paused,
                trigger: "pause".to_string(),
            },
            StatusTransition {
                from: JourneyStatus::Paused,
                to: JourneyStatus::Active,
                trigger: "resume".to_string(),
            },
            StatusTransition {
                from: JourneyStatus::Active,
                to: JourneyStatus::Completed,
                trigger: "steps_exhausted".to_string(),
            },
            StatusTransition {
                from: JourneyStatus::Active,
                to: JourneyStatus::Cancelled,
                trigger: "cancel".to_string(),
            },
            StatusTransition {
                from: JourneyStatus::Paused,
                to: JourneyStatus::Cancelled,
                trigger: "cancel_while_paused".to_string(),
            },
        ];

        Self { transitions }
    }

    /// Returns `true` if the given transition is allowed.
    pub fn can_transition(&self, from: JourneyStatus, to: JourneyStatus) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == from && t.to == to)
    }

    /// Validates a transition, returning the new status or an error.
    pub fn transition(&self, from: JourneyStatus, to: JourneyStatus) -> Result<JourneyStatus> {
        if self.can_transition(from, to) {
            Ok(to)
        } else {
            Err(anyhow!(
                "Invalid journey status transition from {:?} to {:?}",
                from,
                to
            ))
        }
    }
}

impl Default for JourneyStatusMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let machine = JourneyStatusMachine::new();
        assert!(machine.can_transition(JourneyStatus::Active, JourneyStatus::Paused));
        assert!(machine.can_transition(JourneyStatus::Paused, JourneyStatus::Active));
        assert!(machine.can_transition(JourneyStatus::Active, JourneyStatus::Completed));
        assert!(machine.can_transition(JourneyStatus::Paused, JourneyStatus::Cancelled));
    }

    #[test]
    fn test_terminal_statuses() {
        let machine = JourneyStatusMachine::new();
        assert!(!machine.can_transition(JourneyStatus::Completed, JourneyStatus::Active));
        assert!(!machine.can_transition(JourneyStatus::Cancelled, JourneyStatus::Active));
        assert!(machine
            .transition(JourneyStatus::Completed, JourneyStatus::Paused)
            .is_err());
    }
}
