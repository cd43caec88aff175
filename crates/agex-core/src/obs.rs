//! Structured observability hooks for task lifecycle events.
//!
//! - Task-scoped spans: [`TaskSpan`] RAII guard for synchronous sections,
//!   [`task_span`] for instrumenting futures.
//! - `emit_*` functions for start, dispatch, step completion, recovery
//!   decisions and finish.
//!
//! Events are emitted at `info!` level with an `event` field naming them.

use tracing::{info, warn};

/// Span tagged with the run id and task text.
pub fn task_span(run_id: &str, task: &str) -> tracing::Span {
    tracing::info_span!("agex.task", run_id = %run_id, task = %task)
}

/// RAII guard that enters a task-scoped span until dropped.
///
/// The entered guard is `!Send`; async code should use [`task_span`] with
/// `tracing::Instrument` instead.
pub struct TaskSpan {
    _span: tracing::span::EnteredSpan,
}

impl TaskSpan {
    pub fn enter(run_id: &str, task: &str) -> Self {
        Self {
            _span: task_span(run_id, task).entered(),
        }
    }
}

pub fn emit_task_started(run_id: &str, task: &str, planned_steps: usize) {
    info!(event = "task.started", run_id = %run_id, task = %task, planned_steps);
}

pub fn emit_step_dispatched(step_id: &str, tool: &str, attempt: u32) {
    info!(event = "step.dispatched", step_id = %step_id, tool = %tool, attempt);
}

pub fn emit_step_finished(step_id: &str, status: &str, duration_ms: u64) {
    info!(event = "step.finished", step_id = %step_id, status = %status, duration_ms);
}

pub fn emit_recovery_decided(step_id: &str, failure_class: &str, action: &str, rationale: &str) {
    info!(
        event = "recovery.decided",
        step_id = %step_id,
        failure_class = %failure_class,
        action = %action,
        rationale = %rationale,
    );
}

pub fn emit_task_finished(run_id: &str, outcome: &str, duration_ms: u64, steps: usize, success: bool) {
    info!(
        event = "task.finished",
        run_id = %run_id,
        outcome = %outcome,
        duration_ms,
        steps,
        success,
    );
}

/// Warning: the loop stopped with pending steps that can never become ready.
pub fn emit_task_stalled(run_id: &str, blocked: &[String]) {
    warn!(event = "task.stalled", run_id = %run_id, blocked = ?blocked);
}
