//! Journey orchestration — per-customer multi-step journeys advanced by a
//! cooperative scheduler under frequency constraints.

pub mod evaluator;
pub mod orchestrator;
pub mod queue;
pub mod runtime;
pub mod state_machine;
pub mod types;

pub use orchestrator::{ActionHandler, JourneyOrchestrator, NoOpActionHandler, StepResolution};
pub use runtime::OrchestratorRuntime;
pub use types::{
    CustomerJourney, InMemoryTemplateStore, JourneyStage, JourneyStatus, JourneyStep,
    JourneyTemplate, JourneyTemplateStore, StepType,
};
