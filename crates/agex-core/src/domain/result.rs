//! Execution records produced by the orchestration loop.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::duration_secs;
use super::step::{Params, StepId};
use crate::recovery::RecoveryDecision;
use crate::tooling::capability::ToolResult;

/// How a task run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    /// Pending steps remain but none can ever become ready.
    Stalled,
    /// The iteration ceiling was reached first.
    StepBudgetExhausted,
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Stalled => "stalled",
            Self::StepBudgetExhausted => "step_budget_exhausted",
        };
        f.write_str(s)
    }
}

/// Record of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub step_id: StepId,
    pub tool: String,
    pub description: String,
    pub params: Params,
    pub result: Option<ToolResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Retries consumed by the step before this dispatch.
    pub retries: u32,
}

impl ExecutionStep {
    pub fn succeeded(&self) -> bool {
        self.result.as_ref().is_some_and(ToolResult::is_success)
    }
}

/// Result payload of one task run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub run_id: String,
    pub task: String,
    pub success: bool,
    pub outcome: TaskOutcome,
    pub steps: Vec<ExecutionStep>,
    #[serde(with = "duration_secs")]
    pub total_time: Duration,
    pub error: Option<String>,
    #[serde(default)]
    pub recovery: Vec<RecoveryDecision>,
    /// Final plan snapshot, iteration count and caller-supplied context.
    #[serde(default)]
    pub metadata: Params,
}

impl ExecutionResult {
    pub fn succeeded_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.succeeded()).count()
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.len() - self.succeeded_steps()
    }

    /// Multi-line human-readable summary.
    pub fn summary(&self) -> String {
        let status = if self.success { "SUCCESS" } else { "FAILED" };
        let mut lines = vec![
            format!("Task: {}", self.task),
            format!("Status: {status} ({})", self.outcome),
            format!("Run: {}", self.run_id),
            format!(
                "Steps: {} ({} succeeded, {} failed)",
                self.steps.len(),
                self.succeeded_steps(),
                self.failed_steps()
            ),
            format!("Total time: {:.2}s", self.total_time.as_secs_f64()),
        ];
        if !self.recovery.is_empty() {
            lines.push(format!("Recovery decisions: {}", self.recovery.len()));
        }
        if let Some(error) = &self.error {
            lines.push(format!("Error: {error}"));
        }
        lines.join("\n")
    }
}
