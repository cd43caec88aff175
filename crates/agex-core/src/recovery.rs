//! Recovery controller: what to do after a step fails.
//!
//! The controller is called by the orchestration loop after it has marked a
//! step `Failed`. It classifies the failure, then chooses one of:
//!
//! - **Retry**: the class is neither a validation nor a capability failure
//!   and the step's retry ceiling allows another attempt; the step goes back
//!   to `Pending`.
//! - **Substitute**: append one recovery step with no dependencies (lookup
//!   fallback for a missing file, privilege escalation for a denied shell
//!   command) once retries are exhausted; the failed step stays `Failed`.
//! - **GiveUp**: nothing else applies; the step stays `Failed`.
//!
//! The controller mutates only the step it was invoked on and otherwise only
//! appends.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::step::{Params, StepId, StepStatus};
use crate::metrics::METRICS;
use crate::obs;
use crate::plan::{ExecutionPlan, PlanError};
use crate::tooling::capability::{param_str, ToolResult, ToolStatus};

/// Coarse failure taxonomy driving the recovery decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Unknown tool or malformed parameters.
    Validation,
    /// Sandbox denylist hit.
    CapabilityDenied,
    Access,
    Timeout,
    NotFound,
    Execution,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::CapabilityDenied => "capability_denied",
            Self::Access => "access",
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::Execution => "execution",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "validation" => Some(Self::Validation),
            "capability_denied" => Some(Self::CapabilityDenied),
            "access" => Some(Self::Access),
            "timeout" => Some(Self::Timeout),
            "not_found" => Some(Self::NotFound),
            "execution" => Some(Self::Execution),
            _ => None,
        }
    }

    /// Whether the same step may be re-attempted.
    ///
    /// Only failures that the same call is certain to hit again are excluded.
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Validation | Self::CapabilityDenied)
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action chosen for one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    Substitute,
    GiveUp,
}

impl RecoveryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Substitute => "substitute",
            Self::GiveUp => "give_up",
        }
    }
}

/// One auditable decision, kept on the execution result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryDecision {
    pub step_id: StepId,
    pub failure_class: FailureClass,
    pub action: RecoveryAction,
    pub rationale: String,
    /// Step appended by a `Substitute` decision.
    pub recovery_step: Option<StepId>,
    pub decided_at: DateTime<Utc>,
}

/// Which substitutions the controller may perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryPolicy {
    /// `file_read` not found → `search` for the file name.
    pub allow_lookup_fallback: bool,
    /// `shell` access failure → one `sudo` re-run.
    pub allow_privilege_escalation: bool,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            allow_lookup_fallback: true,
            allow_privilege_escalation: true,
        }
    }
}

/// Classify a failed dispatch.
///
/// Structured tags set by the registry, tools and sandbox win; then the
/// result status; then keywords in the error text.
pub fn classify_failure(result: &ToolResult) -> FailureClass {
    if let Some(class) = result.error_kind().and_then(FailureClass::parse) {
        return class;
    }
    match result.status {
        ToolStatus::Timeout => return FailureClass::Timeout,
        ToolStatus::PermissionDenied => return FailureClass::Access,
        ToolStatus::Success | ToolStatus::Error => {}
    }

    let msg = result.error_message().to_lowercase();
    if msg.contains("unknown tool") || msg.contains("missing required parameter") {
        return FailureClass::Validation;
    }
    if msg.contains("blocked capability") {
        return FailureClass::CapabilityDenied;
    }
    if msg.contains("permission denied") || msg.contains("access denied") {
        return FailureClass::Access;
    }
    if msg.contains("timed out") {
        return FailureClass::Timeout;
    }
    if msg.contains("not found") || msg.contains("no such file") {
        return FailureClass::NotFound;
    }
    FailureClass::Execution
}

/// Stateless decision maker applied by the orchestration loop.
#[derive(Debug, Clone, Default)]
pub struct RecoveryController {
    policy: RecoveryPolicy,
}

struct Substitution {
    tool: &'static str,
    params: Params,
    description: String,
    rationale: String,
}

impl RecoveryController {
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self { policy }
    }

    /// Decide and apply recovery for the failed step `step_id`.
    pub fn handle_failure(
        &self,
        plan: &mut ExecutionPlan,
        step_id: &StepId,
        result: &ToolResult,
    ) -> Result<RecoveryDecision, PlanError> {
        let class = classify_failure(result);
        let step = plan
            .get_step(step_id)
            .ok_or_else(|| PlanError::UnknownStep(step_id.to_string()))?;
        if step.status != StepStatus::Failed {
            return Err(PlanError::InvalidTransition {
                step: step_id.to_string(),
                from: step.status,
                to: StepStatus::Pending,
            });
        }

        let (action, rationale, recovery_step) = if class.is_retryable() && step.can_retry() {
            let rationale = format!(
                "{class} failure; retry {} of {}",
                step.retry_count + 1,
                step.max_retries
            );
            plan.step_mut(step_id)?.reset_for_retry()?;
            METRICS.inc_retries();
            (RecoveryAction::Retry, rationale, None)
        } else if let Some(sub) = self.substitution(&step.tool, &step.params, class, result) {
            let new_id = plan
                .add_step(sub.tool, sub.params, sub.description, Vec::new())
                .id
                .clone();
            METRICS.inc_recoveries();
            (RecoveryAction::Substitute, sub.rationale, Some(new_id))
        } else {
            let rationale = if class.is_retryable() {
                format!("{class} failure; retry ceiling reached and no substitution applies")
            } else {
                format!("{class} failure is not retryable and no substitution applies")
            };
            (RecoveryAction::GiveUp, rationale, None)
        };

        obs::emit_recovery_decided(step_id.as_str(), class.as_str(), action.as_str(), &rationale);
        Ok(RecoveryDecision {
            step_id: step_id.clone(),
            failure_class: class,
            action,
            rationale,
            recovery_step,
            decided_at: Utc::now(),
        })
    }

    fn substitution(
        &self,
        tool: &str,
        params: &Params,
        class: FailureClass,
        result: &ToolResult,
    ) -> Option<Substitution> {
        match (tool, class) {
            ("file_read", FailureClass::NotFound) if self.policy.allow_lookup_fallback => {
                let path = param_str(params, "path")?;
                let name = Path::new(path).file_name()?.to_string_lossy().into_owned();
                let mut search = Params::new();
                search.insert("pattern".into(), Value::String(regex::escape(&name)));
                search.insert("file_pattern".into(), Value::String("*".into()));
                Some(Substitution {
                    tool: "search",
                    params: search,
                    description: format!("Search for file: {name}"),
                    rationale: format!("{path} not found; searching for {name}"),
                })
            }
            ("shell", _) if self.policy.allow_privilege_escalation => {
                let denied = class == FailureClass::Access
                    || result
                        .error_message()
                        .to_lowercase()
                        .contains("permission denied");
                let command = param_str(params, "command")?;
                if !denied || command.trim_start().starts_with("sudo") {
                    return None;
                }
                let mut escalated = params.clone();
                escalated.insert("command".into(), Value::String(format!("sudo {command}")));
                Some(Substitution {
                    tool: "shell",
                    params: escalated,
                    description: format!("Retry with sudo: {command}"),
                    rationale: "permission denied; re-running once with sudo".to_string(),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn failed_plan(tool: &str, params: Params) -> (ExecutionPlan, StepId) {
        failed_plan_with_retries(tool, params, 2)
    }

    fn failed_plan_with_retries(
        tool: &str,
        params: Params,
        max_retries: u32,
    ) -> (ExecutionPlan, StepId) {
        let mut plan = ExecutionPlan::new("t", Params::new());
        let id = plan.add_step(tool, params, "d", vec![]).id.clone();
        let step = plan.get_step_mut(&id).unwrap();
        step.max_retries = max_retries;
        step.start().unwrap();
        step.fail("boom").unwrap();
        (plan, id)
    }

    fn with(key: &str, value: &str) -> Params {
        let mut p = Params::new();
        p.insert(key.into(), json!(value));
        p
    }

    #[test]
    fn test_classify_prefers_tags_then_status_then_text() {
        let tagged = ToolResult::error("whatever").with_error_kind("validation");
        assert_eq!(classify_failure(&tagged), FailureClass::Validation);
        assert_eq!(
            classify_failure(&ToolResult::permission_denied("x")),
            FailureClass::Access
        );
        assert_eq!(
            classify_failure(&ToolResult::error("cat: x: No such file or directory")),
            FailureClass::NotFound
        );
        assert_eq!(
            classify_failure(&ToolResult::error("segfault")),
            FailureClass::Execution
        );
    }

    #[test]
    fn test_execution_failure_retries_until_ceiling() {
        let (mut plan, id) = failed_plan("shell", with("command", "false"));
        let controller = RecoveryController::default();
        let result = ToolResult::error("exit 1");

        let d = controller.handle_failure(&mut plan, &id, &result).unwrap();
        assert_eq!(d.action, RecoveryAction::Retry);
        assert_eq!(plan.get_step(&id).unwrap().status, StepStatus::Pending);
        assert_eq!(plan.get_step(&id).unwrap().retry_count, 1);
    }

    #[test]
    fn test_validation_never_retried() {
        let (mut plan, id) = failed_plan("nope", Params::new());
        let result = ToolResult::error("Unknown tool: nope").with_error_kind("validation");
        let d = RecoveryController::default()
            .handle_failure(&mut plan, &id, &result)
            .unwrap();
        assert_eq!(d.action, RecoveryAction::GiveUp);
        assert_eq!(plan.get_step(&id).unwrap().retry_count, 0);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_access_failure_retried_before_escalation() {
        let (mut plan, id) = failed_plan("shell", with("command", "cat /root/x"));
        let d = RecoveryController::default()
            .handle_failure(&mut plan, &id, &ToolResult::permission_denied("denied"))
            .unwrap();
        assert_eq!(d.failure_class, FailureClass::Access);
        assert_eq!(d.action, RecoveryAction::Retry);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_capability_denied_never_retried() {
        let (mut plan, id) = failed_plan("shell", with("command", "rm -rf /"));
        let result =
            ToolResult::error("Command not allowed").with_error_kind("capability_denied");
        let d = RecoveryController::default()
            .handle_failure(&mut plan, &id, &result)
            .unwrap();
        assert_eq!(d.action, RecoveryAction::GiveUp);
        assert_eq!(plan.get_step(&id).unwrap().retry_count, 0);
    }

    #[test]
    fn test_shell_permission_denied_escalates_once() {
        let (mut plan, id) = failed_plan_with_retries("shell", with("command", "cat /root/x"), 0);
        let result = ToolResult::error("cat: /root/x: Permission denied");
        let d = RecoveryController::default()
            .handle_failure(&mut plan, &id, &result)
            .unwrap();
        assert_eq!(d.failure_class, FailureClass::Access);
        assert_eq!(d.action, RecoveryAction::Substitute);
        let new = plan.get_step(d.recovery_step.as_ref().unwrap()).unwrap();
        assert_eq!(new.params["command"], json!("sudo cat /root/x"));
        assert!(new.depends_on.is_empty());
        assert_eq!(plan.get_step(&id).unwrap().status, StepStatus::Failed);
    }

    #[test]
    fn test_sudo_command_not_escalated_again() {
        let (mut plan, id) =
            failed_plan_with_retries("shell", with("command", "sudo cat /root/x"), 0);
        let result = ToolResult::permission_denied("Permission denied");
        let d = RecoveryController::default()
            .handle_failure(&mut plan, &id, &result)
            .unwrap();
        assert_eq!(d.action, RecoveryAction::GiveUp);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_escalation_disabled_by_policy() {
        let (mut plan, id) = failed_plan_with_retries("shell", with("command", "cat /root/x"), 0);
        let controller = RecoveryController::new(RecoveryPolicy {
            allow_privilege_escalation: false,
            ..RecoveryPolicy::default()
        });
        let d = controller
            .handle_failure(&mut plan, &id, &ToolResult::permission_denied("denied"))
            .unwrap();
        assert_eq!(d.action, RecoveryAction::GiveUp);
    }

    #[test]
    fn test_rejects_step_not_failed() {
        let mut plan = ExecutionPlan::new("t", Params::new());
        let id = plan.add_step("shell", Params::new(), "d", vec![]).id.clone();
        let err = RecoveryController::default()
            .handle_failure(&mut plan, &id, &ToolResult::error("x"))
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition { .. }));
    }
}
