//! Plan steps and their lifecycle state machine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::plan::error::PlanError;

/// Opaque named-parameter bag passed to capabilities.
pub type Params = Map<String, Value>;

/// Default retry ceiling for a freshly created step.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Stable identifier of a step within one plan (`step_1`, `step_2`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Identifier for the `seq`-th step of a plan (1-based).
    pub fn from_seq(seq: u64) -> Self {
        Self(format!("step_{seq}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a step.
///
/// `Pending → Running → {Completed, Failed}`; `Failed → Pending` only through
/// a bounded retry; `Pending → Skipped` is reserved for planner decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Whether no further transition is expected without recovery.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Single-character marker used in plan summaries.
    pub fn icon(self) -> char {
        match self {
            Self::Pending => ' ',
            Self::Running => '>',
            Self::Completed => '+',
            Self::Failed => 'X',
            Self::Skipped => '-',
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// A single unit of work bound to one capability invocation or sandbox run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub tool: String,
    pub params: Params,
    pub description: String,
    pub depends_on: Vec<StepId>,
    pub status: StepStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl Step {
    pub fn new(
        id: StepId,
        tool: impl Into<String>,
        params: Params,
        description: impl Into<String>,
        depends_on: Vec<StepId>,
    ) -> Self {
        Self {
            id,
            tool: tool.into(),
            params,
            description: description.into(),
            depends_on,
            status: StepStatus::Pending,
            result: None,
            error: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Whether the retry ceiling still allows another attempt.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// `Pending → Running`.
    pub fn start(&mut self) -> Result<(), PlanError> {
        self.transition(StepStatus::Pending, StepStatus::Running)
    }

    /// `Running → Completed`, storing the result payload.
    pub fn complete(&mut self, output: impl Into<String>) -> Result<(), PlanError> {
        self.transition(StepStatus::Running, StepStatus::Completed)?;
        self.result = Some(output.into());
        self.error = None;
        Ok(())
    }

    /// `Running → Failed`, recording the error message.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), PlanError> {
        self.transition(StepStatus::Running, StepStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// `Failed → Pending`, consuming one retry.
    pub fn reset_for_retry(&mut self) -> Result<(), PlanError> {
        if !self.can_retry() {
            return Err(PlanError::RetriesExhausted {
                step: self.id.to_string(),
                max_retries: self.max_retries,
            });
        }
        self.transition(StepStatus::Failed, StepStatus::Pending)?;
        self.retry_count += 1;
        Ok(())
    }

    /// `Pending → Skipped`.
    pub fn skip(&mut self) -> Result<(), PlanError> {
        self.transition(StepStatus::Pending, StepStatus::Skipped)
    }

    fn transition(&mut self, from: StepStatus, to: StepStatus) -> Result<(), PlanError> {
        if self.status != from {
            return Err(PlanError::InvalidTransition {
                step: self.id.to_string(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
