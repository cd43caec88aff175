use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::step::Params;
use crate::recovery::FailureClass;
use crate::sandbox::process::{run_with_deadline, RunOutcome};
use crate::tooling::capability::{param_str, param_u64, Capability, ParamSpec, ParamType, ToolResult};
use crate::tooling::config::ShellConfig;
use crate::tooling::policy::CommandPolicy;

/// Runs a command line through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellTool {
    policy: CommandPolicy,
    default_timeout_secs: u64,
    working_dir: Option<PathBuf>,
}

impl ShellTool {
    pub fn new(config: ShellConfig) -> Self {
        Self {
            policy: CommandPolicy::new(config.blocked_commands, config.allowed_commands),
            default_timeout_secs: config.default_timeout_secs,
            working_dir: config.working_dir,
        }
    }
}

#[async_trait]
impl Capability for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("command", ParamType::String, "Shell command to execute"),
            ParamSpec::optional("timeout", ParamType::Integer, "Timeout in seconds", 30),
            ParamSpec::optional(
                "working_dir",
                ParamType::String,
                "Directory to run in, overriding the configured one",
                serde_json::Value::Null,
            ),
        ]
    }

    async fn invoke(&self, params: &Params) -> ToolResult {
        let Some(command) = param_str(params, "command") else {
            return ToolResult::error("Parameter 'command' must be a string");
        };
        if !self.policy.is_allowed(command) {
            return ToolResult::permission_denied(format!("Command not allowed: {command}"))
                .with_error_kind(FailureClass::CapabilityDenied.as_str());
        }

        let timeout_secs = param_u64(params, "timeout").unwrap_or(self.default_timeout_secs);
        let working_dir = param_str(params, "working_dir")
            .map(PathBuf::from)
            .or_else(|| self.working_dir.clone());

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(dir) = &working_dir {
            cmd.current_dir(dir);
        }

        let outcome = match run_with_deadline(cmd, Duration::from_secs(timeout_secs)).await {
            Ok(outcome) => outcome,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return ToolResult::permission_denied(format!("Permission denied: {e}"));
            }
            Err(e) => return ToolResult::error(format!("Failed to run command: {e}")),
        };

        let out = match outcome {
            RunOutcome::Exited(out) => out,
            RunOutcome::TimedOut => {
                return ToolResult::timeout(format!("Command timed out after {timeout_secs}s"))
                    .with_metadata("command", command);
            }
        };

        let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
        let mut output = stdout;
        if !stderr.is_empty() {
            output.push_str("\n[stderr]: ");
            output.push_str(&stderr);
        }
        let returncode = out.status.code().unwrap_or(-1);

        let result = if out.status.success() {
            ToolResult::success(output)
        } else {
            let message = if stderr.trim().is_empty() {
                format!("Command exited with code {returncode}")
            } else {
                stderr
            };
            ToolResult::error(message).with_output(output)
        };
        result
            .with_metadata("returncode", returncode)
            .with_metadata("command", command)
    }
}
