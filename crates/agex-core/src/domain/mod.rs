//! Core domain types: steps, execution records and the error taxonomy.

pub mod duration_secs;
pub mod error;
pub mod result;
pub mod step;

pub use error::{AgexError, Result};
pub use result::{ExecutionResult, ExecutionStep, TaskOutcome};
pub use step::{Params, Step, StepId, StepStatus, DEFAULT_MAX_RETRIES};
