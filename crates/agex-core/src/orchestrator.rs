//! Orchestration loop: drives an [`ExecutionPlan`] to completion, stall, or
//! the iteration ceiling.
//!
//! Each iteration recomputes the ready set, dispatches it (one step at a time
//! or concurrently, per [`ExecutionMode`]) and applies results to the plan on
//! the loop task. Failures go through the [`RecoveryController`]. Step
//! failures never escape as errors; they are recorded in the returned
//! [`ExecutionResult`].

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{warn, Instrument};

use crate::config::{ExecutionMode, ExecutorConfig};
use crate::domain::result::{ExecutionResult, ExecutionStep, TaskOutcome};
use crate::domain::step::{Params, StepId, StepStatus};
use crate::metrics::METRICS;
use crate::obs;
use crate::plan::{ExecutionPlan, PlanError};
use crate::planner::TaskPlanner;
use crate::recovery::{FailureClass, RecoveryController, RecoveryDecision};
use crate::sandbox::CodeSandbox;
use crate::tooling::capability::{param_str, ToolResult};
use crate::tooling::CapabilityRegistry;

/// Tool id routed to the code sandbox instead of the registry.
pub const SANDBOX_TOOL: &str = "sandbox";

/// Observer invoked after every dispatch record.
pub type StepCallback = Arc<dyn Fn(&ExecutionStep) + Send + Sync>;

/// One step taken out of the plan for dispatch.
#[derive(Debug, Clone)]
struct Dispatch {
    step_id: StepId,
    tool: String,
    description: String,
    params: Params,
    retries: u32,
}

#[derive(Debug)]
struct Finished {
    dispatch: Dispatch,
    result: ToolResult,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    duration: Duration,
}

/// Accumulated per-run state.
#[derive(Default)]
struct RunLog {
    records: Vec<ExecutionStep>,
    decisions: Vec<RecoveryDecision>,
}

pub struct AgenticExecutor {
    registry: CapabilityRegistry,
    config: ExecutorConfig,
    planner: TaskPlanner,
    recovery: RecoveryController,
    on_step_complete: Option<StepCallback>,
}

impl std::fmt::Debug for AgenticExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgenticExecutor")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("on_step_complete", &self.on_step_complete.is_some())
            .finish()
    }
}

impl AgenticExecutor {
    pub fn new(registry: CapabilityRegistry, config: ExecutorConfig) -> Self {
        let registry = match config.tool_timeout_ms {
            Some(ms) => registry.with_invoke_timeout(Duration::from_millis(ms)),
            None => registry,
        };
        Self {
            registry,
            planner: TaskPlanner::new(config.default_max_retries),
            recovery: RecoveryController::new(config.recovery.clone()),
            config,
            on_step_complete: None,
        }
    }

    /// Executor over the builtin tools configured by `config.tools`.
    pub fn from_config(config: ExecutorConfig) -> Self {
        let registry = CapabilityRegistry::with_defaults(&config.tools);
        Self::new(registry, config)
    }

    pub fn with_defaults() -> Self {
        Self::from_config(ExecutorConfig::default())
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn with_step_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ExecutionStep) + Send + Sync + 'static,
    {
        self.on_step_complete = Some(Arc::new(callback));
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Plan `task` without executing it.
    pub fn plan(&self, task: &str, context: &Params) -> Result<ExecutionPlan, PlanError> {
        self.planner.plan(task, context)
    }

    /// Plan and run `task`.
    pub async fn execute(&self, task: &str, context: Params) -> ExecutionResult {
        match self.plan(task, &context) {
            Ok(plan) => self.run_plan(plan).await,
            Err(e) => planning_failure(task, context, e),
        }
    }

    /// Drive `plan` until it is complete, stalls, or the iteration budget runs out.
    pub async fn run_plan(&self, plan: ExecutionPlan) -> ExecutionResult {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = obs::task_span(&run_id, &plan.task);
        self.drive(run_id, plan).instrument(span).await
    }

    async fn drive(&self, run_id: String, mut plan: ExecutionPlan) -> ExecutionResult {
        let started = Instant::now();
        obs::emit_task_started(&run_id, &plan.task, plan.len());

        let mut log = RunLog::default();
        let mut iteration = 0u32;
        let mut stalled = false;

        while !plan.is_complete() && iteration < self.config.max_steps {
            let ready = plan.ready_step_ids();
            if ready.is_empty() {
                stalled = true;
                break;
            }

            match self.config.mode {
                ExecutionMode::Sequential => {
                    for id in &ready {
                        let Some(job) = begin(&mut plan, id) else {
                            continue;
                        };
                        let done = self.dispatch(job).await;
                        self.apply(&mut plan, done, &mut log);
                    }
                }
                ExecutionMode::Parallel => {
                    let jobs: Vec<Dispatch> =
                        ready.iter().filter_map(|id| begin(&mut plan, id)).collect();
                    let done = join_all(jobs.into_iter().map(|job| self.dispatch(job))).await;
                    for finished in done {
                        self.apply(&mut plan, finished, &mut log);
                    }
                }
            }
            iteration += 1;
        }

        let result = self.conclude(run_id, plan, log, iteration, stalled, started.elapsed());
        obs::emit_task_finished(
            &result.run_id,
            &result.outcome.to_string(),
            result.total_time.as_millis() as u64,
            result.steps.len(),
            result.success,
        );
        METRICS.flush();
        result
    }

    async fn dispatch(&self, job: Dispatch) -> Finished {
        METRICS.inc_steps_dispatched();
        obs::emit_step_dispatched(job.step_id.as_str(), &job.tool, job.retries + 1);

        let started_at = Utc::now();
        let clock = Instant::now();
        let result = if job.tool == SANDBOX_TOOL {
            self.run_sandbox(&job.params).await
        } else {
            self.registry.execute(&job.tool, &job.params).await
        };
        Finished {
            dispatch: job,
            result,
            started_at,
            finished_at: Utc::now(),
            duration: clock.elapsed(),
        }
    }

    /// Run a `sandbox` step: `params.code` inline, or `params.path` from disk.
    async fn run_sandbox(&self, params: &Params) -> ToolResult {
        let sandbox = match CodeSandbox::acquire(self.config.sandbox.clone()) {
            Ok(sandbox) => sandbox,
            Err(e) => return ToolResult::error(format!("Sandbox setup failed: {e}")),
        };
        let outcome = if let Some(code) = param_str(params, "code") {
            sandbox.execute(code).await
        } else if let Some(path) = param_str(params, "path") {
            sandbox.execute_file(Path::new(path)).await
        } else {
            sandbox.release();
            return ToolResult::error("Missing required parameter: code")
                .with_error_kind(FailureClass::Validation.as_str());
        };
        sandbox.release();
        outcome.to_tool_result()
    }

    /// Apply one dispatch result to the plan (loop task only).
    fn apply(&self, plan: &mut ExecutionPlan, done: Finished, log: &mut RunLog) {
        let Finished {
            dispatch,
            result,
            started_at,
            finished_at,
            duration,
        } = done;
        let id = &dispatch.step_id;

        let transition = match plan.step_mut(id) {
            Ok(step) if result.is_success() => step.complete(result.output.clone()),
            Ok(step) => step.fail(result.error_message()),
            Err(e) => Err(e),
        };
        match transition {
            Ok(()) if !result.is_success() => {
                match self.recovery.handle_failure(plan, id, &result) {
                    Ok(decision) => log.decisions.push(decision),
                    Err(e) => warn!(step_id = %id, error = %e, "recovery could not be applied"),
                }
            }
            Ok(()) => {}
            Err(e) => warn!(step_id = %id, error = %e, "step transition rejected"),
        }

        obs::emit_step_finished(
            id.as_str(),
            &result.status.to_string(),
            duration.as_millis() as u64,
        );
        let record = ExecutionStep {
            step_id: dispatch.step_id,
            tool: dispatch.tool,
            description: dispatch.description,
            params: dispatch.params,
            result: Some(result),
            started_at,
            finished_at,
            duration,
            retries: dispatch.retries,
        };
        if let Some(callback) = &self.on_step_complete {
            callback(&record);
        }
        log.records.push(record);
    }

    fn conclude(
        &self,
        run_id: String,
        plan: ExecutionPlan,
        log: RunLog,
        iterations: u32,
        stalled: bool,
        total_time: Duration,
    ) -> ExecutionResult {
        let complete = plan.is_complete();
        let success = complete
            && plan
                .steps()
                .iter()
                .all(|s| s.status == StepStatus::Completed);

        let outcome = if stalled {
            TaskOutcome::Stalled
        } else if !complete {
            TaskOutcome::StepBudgetExhausted
        } else if success {
            TaskOutcome::Succeeded
        } else {
            TaskOutcome::Failed
        };

        let first_failure = plan
            .first_failure()
            .map(|s| s.error.clone().unwrap_or_else(|| format!("{} failed", s.id)));
        let error = match outcome {
            TaskOutcome::Succeeded => None,
            TaskOutcome::Failed => first_failure,
            TaskOutcome::Stalled => {
                let blocked: Vec<String> = plan
                    .blocked_steps()
                    .iter()
                    .map(|s| s.id.to_string())
                    .collect();
                obs::emit_task_stalled(&run_id, &blocked);
                first_failure.or_else(|| {
                    Some(format!(
                        "Execution stalled: no ready steps; blocked: {}",
                        blocked.join(", ")
                    ))
                })
            }
            TaskOutcome::StepBudgetExhausted => first_failure.or_else(|| {
                Some(format!(
                    "Step budget exhausted after {iterations} iterations"
                ))
            }),
        };

        let mut metadata = Params::new();
        metadata.insert("iterations".into(), iterations.into());
        metadata.insert("mode".into(), json!(self.config.mode));
        metadata.insert("progress".into(), json!(plan.progress()));
        metadata.insert(
            "plan".into(),
            serde_json::to_value(&plan).unwrap_or(Value::Null),
        );

        ExecutionResult {
            run_id,
            task: plan.task,
            success,
            outcome,
            steps: log.records,
            total_time,
            error,
            recovery: log.decisions,
            metadata,
        }
    }

    /// Run one fragment in the sandbox, without retries.
    pub async fn execute_code(&self, code: &str, description: &str) -> ExecutionResult {
        let mut plan = ExecutionPlan::new(description, Params::new()).with_default_max_retries(0);
        let mut params = Params::new();
        params.insert("code".into(), Value::String(code.to_string()));
        plan.add_step(SANDBOX_TOOL, params, description, Vec::new());
        self.run_plan(plan).await
    }

    /// Run a test command through the `shell` tool, optionally in `working_dir`.
    pub async fn run_tests(&self, command: &str, working_dir: Option<&Path>) -> ExecutionResult {
        let mut context = Params::new();
        context.insert("command".into(), Value::String(command.to_string()));
        let mut plan = match self.plan("run tests", &context) {
            Ok(plan) => plan,
            Err(e) => return planning_failure("run tests", context, e),
        };
        if let Some(dir) = working_dir {
            for id in plan.ready_step_ids() {
                if let Some(step) = plan.get_step_mut(&id) {
                    step.params.insert(
                        "working_dir".into(),
                        Value::String(dir.to_string_lossy().into_owned()),
                    );
                }
            }
        }
        self.run_plan(plan).await
    }

    /// Replace every occurrence of `old` with `new` in the file at `path`.
    pub async fn edit_file(&self, path: &str, old: &str, new: &str) -> ExecutionResult {
        let run_id = uuid::Uuid::new_v4().to_string();
        let task = format!("Edit file: {path}");
        let clock = Instant::now();
        let mut records = Vec::new();

        let mut read_params = Params::new();
        read_params.insert("path".into(), Value::String(path.to_string()));
        let read = self.invoke_recorded("read", "file_read", read_params, &mut records).await;

        let error = if !read.is_success() {
            Some(read.error_message())
        } else if !read.output.contains(old) {
            Some("Old content not found in file".to_string())
        } else {
            let mut write_params = Params::new();
            write_params.insert("path".into(), Value::String(path.to_string()));
            write_params.insert(
                "content".into(),
                Value::String(read.output.replace(old, new)),
            );
            let write = self
                .invoke_recorded("write", "file_write", write_params, &mut records)
                .await;
            (!write.is_success()).then(|| write.error_message())
        };

        let success = error.is_none();
        ExecutionResult {
            run_id,
            task,
            success,
            outcome: if success {
                TaskOutcome::Succeeded
            } else {
                TaskOutcome::Failed
            },
            steps: records,
            total_time: clock.elapsed(),
            error,
            recovery: Vec::new(),
            metadata: Params::new(),
        }
    }

    async fn invoke_recorded(
        &self,
        step_id: &str,
        tool: &str,
        params: Params,
        records: &mut Vec<ExecutionStep>,
    ) -> ToolResult {
        let job = Dispatch {
            step_id: StepId::from(step_id),
            tool: tool.to_string(),
            description: format!("{tool} for edit"),
            params,
            retries: 0,
        };
        let done = self.dispatch(job).await;
        let result = done.result.clone();
        let record = ExecutionStep {
            step_id: done.dispatch.step_id,
            tool: done.dispatch.tool,
            description: done.dispatch.description,
            params: done.dispatch.params,
            result: Some(done.result),
            started_at: done.started_at,
            finished_at: done.finished_at,
            duration: done.duration,
            retries: 0,
        };
        if let Some(callback) = &self.on_step_complete {
            callback(&record);
        }
        records.push(record);
        result
    }
}

/// Mark a ready step `Running` and snapshot what the dispatch needs.
fn begin(plan: &mut ExecutionPlan, id: &StepId) -> Option<Dispatch> {
    let step = plan.get_step_mut(id)?;
    if let Err(e) = step.start() {
        warn!(step_id = %id, error = %e, "ready step could not start");
        return None;
    }
    Some(Dispatch {
        step_id: step.id.clone(),
        tool: step.tool.clone(),
        description: step.description.clone(),
        params: step.params.clone(),
        retries: step.retry_count,
    })
}

fn planning_failure(task: &str, context: Params, error: PlanError) -> ExecutionResult {
    ExecutionResult {
        run_id: uuid::Uuid::new_v4().to_string(),
        task: task.to_string(),
        success: false,
        outcome: TaskOutcome::Failed,
        steps: Vec::new(),
        total_time: Duration::ZERO,
        error: Some(format!("Planning failed: {error}")),
        recovery: Vec::new(),
        metadata: context,
    }
}
