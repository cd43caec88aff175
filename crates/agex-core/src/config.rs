//! Executor configuration.
//!
//! Every default lives here and is passed explicitly into constructors.
//! Partial JSON documents are accepted: missing fields take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::error::{AgexError, Result};
use crate::domain::step::DEFAULT_MAX_RETRIES;
use crate::recovery::RecoveryPolicy;
use crate::sandbox::SandboxConfig;
use crate::tooling::ToolsConfig;

/// How the ready set of one iteration is dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One ready step at a time, in insertion order.
    #[default]
    Sequential,
    /// The whole ready set concurrently; results applied in ready-set order.
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Iteration ceiling of the orchestration loop.
    pub max_steps: u32,
    pub mode: ExecutionMode,
    /// Retry ceiling assigned to planned steps.
    pub default_max_retries: u32,
    /// Per-invocation bound for registry tools; `None` leaves tools to
    /// their own limits.
    pub tool_timeout_ms: Option<u64>,
    pub recovery: RecoveryPolicy,
    pub sandbox: SandboxConfig,
    pub tools: ToolsConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            mode: ExecutionMode::Sequential,
            default_max_retries: DEFAULT_MAX_RETRIES,
            tool_timeout_ms: None,
            recovery: RecoveryPolicy::default(),
            sandbox: SandboxConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl ExecutorConfig {
    /// Load from a JSON file and validate.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(AgexError::InvalidConfig(
                "max_steps must be greater than zero".to_string(),
            ));
        }
        if self.tool_timeout_ms == Some(0) {
            return Err(AgexError::InvalidConfig(
                "tool_timeout_ms must be greater than zero when set".to_string(),
            ));
        }
        self.sandbox.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.max_steps, 50);
        assert_eq!(cfg.default_max_retries, 2);
        assert_eq!(cfg.mode, ExecutionMode::Sequential);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_json_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"max_steps": 7, "mode": "parallel", "sandbox": {{"timeout_ms": 500}}}}"#
        )
        .unwrap();

        let cfg = ExecutorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(cfg.max_steps, 7);
        assert_eq!(cfg.mode, ExecutionMode::Parallel);
        assert_eq!(cfg.sandbox.timeout_ms, 500);
        assert_eq!(cfg.sandbox.max_output_bytes, 1_048_576);
    }

    #[test]
    fn test_zero_max_steps_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_steps": 0}}"#).unwrap();
        let err = ExecutorConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, AgexError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_sandbox_config_surfaces() {
        let cfg = ExecutorConfig {
            sandbox: SandboxConfig::default().with_timeout_ms(0),
            ..ExecutorConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(AgexError::Sandbox(_))));
    }
}
