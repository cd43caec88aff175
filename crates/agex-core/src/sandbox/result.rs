//! Structured sandbox outcomes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::duration_secs;
use crate::domain::step::Params;
use crate::recovery::FailureClass;
use crate::tooling::capability::ToolResult;

/// Lifecycle/outcome status of one sandbox execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    Ready,
    Running,
    Completed,
    Timeout,
    Error,
    MemoryExceeded,
}

impl std::fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Timeout => "timeout",
            Self::Error => "error",
            Self::MemoryExceeded => "memory_exceeded",
        };
        f.write_str(s)
    }
}

/// Outcome of [`super::CodeSandbox::execute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxResult {
    pub status: SandboxStatus,
    pub stdout: String,
    pub stderr: String,
    #[serde(with = "duration_secs")]
    pub execution_time: Duration,
    /// Never measured by this backend; always `None`.
    pub memory_used_mb: Option<f64>,
    #[serde(default)]
    pub metadata: Params,
}

impl SandboxResult {
    pub(crate) fn new(status: SandboxStatus, stdout: String, stderr: String, elapsed: Duration) -> Self {
        Self {
            status,
            stdout,
            stderr,
            execution_time: elapsed,
            memory_used_mb: None,
            metadata: Params::new(),
        }
    }

    /// Denylist hit: nothing was spawned.
    pub(crate) fn denied(marker: &str) -> Self {
        let mut result = Self::new(
            SandboxStatus::Error,
            String::new(),
            format!("Blocked capability detected: {marker}"),
            Duration::ZERO,
        );
        result
            .metadata
            .insert("blocked_capability".into(), marker.into());
        result
    }

    /// Preparation or launch failure.
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self::new(SandboxStatus::Error, String::new(), message.into(), Duration::ZERO)
    }

    pub(crate) fn timed_out(limit: Duration) -> Self {
        Self::new(
            SandboxStatus::Timeout,
            String::new(),
            format!("Execution timed out after {}ms", limit.as_millis()),
            limit,
        )
    }

    pub fn is_success(&self) -> bool {
        self.status == SandboxStatus::Completed
    }

    /// Whether the denylist rejected the fragment.
    pub fn is_denied(&self) -> bool {
        self.metadata.contains_key("blocked_capability")
    }

    /// Map onto the common tool result shape used by the orchestration loop.
    pub fn to_tool_result(&self) -> ToolResult {
        let result = match self.status {
            SandboxStatus::Completed => ToolResult::success(self.stdout.clone()),
            SandboxStatus::Timeout => {
                ToolResult::timeout(self.stderr.clone()).with_error_kind(FailureClass::Timeout.as_str())
            }
            _ if self.is_denied() => ToolResult::error(self.stderr.clone())
                .with_error_kind(FailureClass::CapabilityDenied.as_str()),
            _ => {
                let message = if self.stderr.trim().is_empty() {
                    format!("Sandbox execution finished with status {}", self.status)
                } else {
                    self.stderr.clone()
                };
                ToolResult::error(message).with_output(self.stdout.clone())
            }
        };
        let mut result = result
            .with_metadata("sandbox_status", self.status.to_string())
            .with_metadata("execution_time", duration_secs::round(self.execution_time));
        for (k, v) in &self.metadata {
            result.metadata.entry(k.clone()).or_insert_with(|| v.clone());
        }
        result
    }
}
