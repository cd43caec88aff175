//! Domain-level error taxonomy for AGEX.
//!
//! Per-step failures are never errors at this level: they are recorded as
//! data on the step (see [`crate::tooling::ToolResult`]). These variants cover
//! infrastructure faults only.

use crate::plan::error::PlanError;
use crate::sandbox::error::SandboxError;

/// AGEX domain errors.
#[derive(Debug, thiserror::Error)]
pub enum AgexError {
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid run id: {0:?}")]
    InvalidRunId(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for AGEX domain operations.
pub type Result<T> = std::result::Result<T, AgexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_mismatch_error() {
        let err = AgexError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_plan_error_converts() {
        let err: AgexError = PlanError::CycleDetected {
            steps: vec!["step_1".to_string()],
        }
        .into();
        assert!(err.to_string().contains("plan error"));
        assert!(err.to_string().contains("step_1"));
    }

    #[test]
    fn test_invalid_config_display() {
        let err = AgexError::InvalidConfig("max_steps must be > 0".to_string());
        assert!(err.to_string().contains("invalid configuration"));
    }
}
