//! Keyword planner: turns a task description plus context into a plan.
//!
//! Rules are checked against the lowercased task in a fixed order and the
//! first match wins. Context values fill in parameters; missing values fall
//! back to per-rule defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::step::{Params, StepId, DEFAULT_MAX_RETRIES};
use crate::plan::{ExecutionPlan, PlanError};

/// Which rule produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    FileRead,
    FileWrite,
    Search,
    RunTests,
    Install,
    Git,
    Refactor,
    Shell,
}

/// Match `task` against the keyword rules.
pub fn classify_task(task: &str) -> TaskKind {
    let t = task.to_lowercase();
    let has = |kw: &str| t.contains(kw);

    if has("read") && has("file") {
        TaskKind::FileRead
    } else if has("write") || has("create") {
        TaskKind::FileWrite
    } else if has("search") || has("find") {
        TaskKind::Search
    } else if has("test") || has("pytest") {
        TaskKind::RunTests
    } else if has("install") {
        TaskKind::Install
    } else if has("git") || has("commit") {
        TaskKind::Git
    } else if has("refactor") || has("rename") {
        TaskKind::Refactor
    } else {
        TaskKind::Shell
    }
}

#[derive(Debug, Clone)]
pub struct TaskPlanner {
    default_max_retries: u32,
}

impl Default for TaskPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl TaskPlanner {
    pub fn new(default_max_retries: u32) -> Self {
        Self {
            default_max_retries,
        }
    }

    /// Build a plan for `task`; `context` is also kept as plan metadata.
    pub fn plan(&self, task: &str, context: &Params) -> Result<ExecutionPlan, PlanError> {
        let mut plan = ExecutionPlan::new(task, context.clone())
            .with_default_max_retries(self.default_max_retries);
        let ctx = |key: &str, default: &str| {
            context_str(context, key).unwrap_or_else(|| default.to_string())
        };

        match classify_task(task) {
            TaskKind::FileRead => {
                let path = ctx("path", "unknown");
                plan.try_add_step(
                    "file_read",
                    params(&[("path", path.as_str())]),
                    format!("Read file: {path}"),
                    vec![],
                )?;
            }
            TaskKind::FileWrite => {
                let path = ctx("path", "output.txt");
                let content = ctx("content", "");
                plan.try_add_step(
                    "file_write",
                    params(&[("path", path.as_str()), ("content", content.as_str())]),
                    format!("Write to file: {path}"),
                    vec![],
                )?;
            }
            TaskKind::Search => {
                let pattern = ctx("pattern", "TODO");
                plan.try_add_step(
                    "search",
                    params(&[("pattern", pattern.as_str())]),
                    format!("Search for pattern: {pattern}"),
                    vec![],
                )?;
            }
            TaskKind::RunTests => {
                let command = ctx("command", "pytest");
                plan.try_add_step(
                    "shell",
                    params(&[("command", command.as_str())]),
                    "Run tests",
                    vec![],
                )?;
            }
            TaskKind::Install => {
                let package = ctx("package", "");
                plan.try_add_step(
                    "shell",
                    params(&[("command", format!("pip install {package}").as_str())]),
                    format!("Install package: {package}"),
                    vec![],
                )?;
            }
            TaskKind::Git => {
                let message = ctx("message", "Update");
                let stage = self.add(
                    &mut plan,
                    "shell",
                    &[("command", "git add -A")],
                    "Stage changes",
                    vec![],
                )?;
                plan.try_add_step(
                    "shell",
                    params(&[("command", format!("git commit -m \"{message}\"").as_str())]),
                    "Create commit",
                    vec![stage],
                )?;
            }
            TaskKind::Refactor => {
                let old_name = ctx("old_name", "");
                let new_name = ctx("new_name", "");
                let files = ctx("files", "*.py");
                let find = self.add(
                    &mut plan,
                    "search",
                    &[("pattern", old_name.as_str())],
                    &format!("Find occurrences of: {old_name}"),
                    vec![],
                )?;
                plan.try_add_step(
                    "shell",
                    params(&[(
                        "command",
                        format!("sed -i 's/{old_name}/{new_name}/g' {files}").as_str(),
                    )]),
                    format!("Replace {old_name} with {new_name}"),
                    vec![find],
                )?;
            }
            TaskKind::Shell => {
                let command = ctx("command", task);
                plan.try_add_step(
                    "shell",
                    params(&[("command", command.as_str())]),
                    format!("Execute: {command}"),
                    vec![],
                )?;
            }
        }
        Ok(plan)
    }

    fn add(
        &self,
        plan: &mut ExecutionPlan,
        tool: &str,
        kv: &[(&str, &str)],
        description: &str,
        depends_on: Vec<StepId>,
    ) -> Result<StepId, PlanError> {
        Ok(plan
            .try_add_step(tool, params(kv), description, depends_on)?
            .id
            .clone())
    }
}

fn params(kv: &[(&str, &str)]) -> Params {
    kv.iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

/// Context value as text; numbers and booleans are stringified.
fn context_str(context: &Params, key: &str) -> Option<String> {
    match context.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ctx(pairs: &[(&str, &str)]) -> Params {
        params(pairs)
    }

    #[test]
    fn test_rule_order_first_match_wins() {
        assert_eq!(classify_task("Read the config file"), TaskKind::FileRead);
        assert_eq!(classify_task("create a test file"), TaskKind::FileWrite);
        assert_eq!(classify_task("find TODOs"), TaskKind::Search);
        assert_eq!(classify_task("run the tests"), TaskKind::RunTests);
        assert_eq!(classify_task("install requests"), TaskKind::Install);
        assert_eq!(classify_task("commit my work"), TaskKind::Git);
        assert_eq!(classify_task("rename foo to bar"), TaskKind::Refactor);
        assert_eq!(classify_task("ls -la"), TaskKind::Shell);
    }

    #[test]
    fn test_git_plan_has_dependency() {
        let plan = TaskPlanner::default()
            .plan("commit changes", &ctx(&[("message", "wip")]))
            .unwrap();
        assert_eq!(plan.len(), 2);
        let commit = &plan.steps()[1];
        assert_eq!(commit.params["command"], json!("git commit -m \"wip\""));
        assert_eq!(commit.depends_on, vec![StepId::from_seq(1)]);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_shell_fallback_uses_task_text() {
        let plan = TaskPlanner::default().plan("echo hello", &Params::new()).unwrap();
        assert_eq!(plan.steps()[0].tool, "shell");
        assert_eq!(plan.steps()[0].params["command"], json!("echo hello"));
        assert_eq!(plan.steps()[0].description, "Execute: echo hello");
    }

    #[test]
    fn test_retry_ceiling_from_planner() {
        let plan = TaskPlanner::new(5)
            .plan("read file", &ctx(&[("path", "a.txt")]))
            .unwrap();
        assert_eq!(plan.steps()[0].max_retries, 5);
        assert_eq!(plan.metadata["path"], json!("a.txt"));
    }

    #[test]
    fn test_refactor_plan() {
        let plan = TaskPlanner::default()
            .plan(
                "refactor names",
                &ctx(&[("old_name", "foo"), ("new_name", "bar"), ("files", "*.rs")]),
            )
            .unwrap();
        assert_eq!(plan.steps()[0].tool, "search");
        assert_eq!(
            plan.steps()[1].params["command"],
            json!("sed -i 's/foo/bar/g' *.rs")
        );
    }
}
