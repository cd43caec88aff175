//! Error types for the plan graph.

use crate::domain::step::StepStatus;

/// Errors produced by plan construction, validation and step transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("step '{step}' has missing dependency '{dependency}'")]
    MissingDependency { step: String, dependency: String },

    #[error("dependency cycle detected among steps: {}", steps.join(", "))]
    CycleDetected { steps: Vec<String> },

    #[error("unknown step: {0}")]
    UnknownStep(String),

    #[error("step '{step}' cannot move from {from} to {to}")]
    InvalidTransition {
        step: String,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("step '{step}' exhausted its retry ceiling ({max_retries})")]
    RetriesExhausted { step: String, max_retries: u32 },
}
