//! Execution plan: an explicit dependency graph of steps.
//!
//! A step is *ready* when it is `Pending` and every dependency id resolves to
//! a `Completed` step. Readiness is recomputed from scratch on every call, so
//! the graph never caches stale state between loop iterations.
//!
//! [`ExecutionPlan::add_step`] accepts arbitrary dependency ids without
//! checking them; a reference to a missing or later step simply never becomes
//! ready. Use [`ExecutionPlan::try_add_step`] or [`ExecutionPlan::validate`]
//! to fail fast instead.

pub mod error;

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::domain::step::{Params, Step, StepId, StepStatus, DEFAULT_MAX_RETRIES};

pub use error::PlanError;

/// Per-status step counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanProgress {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// An ordered collection of steps for one task, plus pass-through metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub task: String,
    pub metadata: Params,
    steps: Vec<Step>,
    next_seq: u64,
    default_max_retries: u32,
}

impl ExecutionPlan {
    pub fn new(task: impl Into<String>, metadata: Params) -> Self {
        Self {
            task: task.into(),
            metadata,
            steps: Vec::new(),
            next_seq: 1,
            default_max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Retry ceiling assigned to steps added after this call.
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Append a step with a fresh id. Dependency ids are not checked.
    pub fn add_step(
        &mut self,
        tool: impl Into<String>,
        params: Params,
        description: impl Into<String>,
        depends_on: Vec<StepId>,
    ) -> &Step {
        let id = StepId::from_seq(self.next_seq);
        self.next_seq += 1;
        let step = Step::new(id, tool, params, description, depends_on)
            .with_max_retries(self.default_max_retries);
        self.steps.push(step);
        &self.steps[self.steps.len() - 1]
    }

    /// Append a step after checking every dependency id exists already.
    ///
    /// Since the new id is fresh, this also rules out self-dependencies and
    /// cycles for plans built exclusively through this method.
    pub fn try_add_step(
        &mut self,
        tool: impl Into<String>,
        params: Params,
        description: impl Into<String>,
        depends_on: Vec<StepId>,
    ) -> Result<&Step, PlanError> {
        if let Some(missing) = depends_on.iter().find(|dep| self.get_step(dep).is_none()) {
            return Err(PlanError::MissingDependency {
                step: StepId::from_seq(self.next_seq).to_string(),
                dependency: missing.to_string(),
            });
        }
        Ok(self.add_step(tool, params, description, depends_on))
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get_step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    pub fn get_step_mut(&mut self, id: &StepId) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| &s.id == id)
    }

    /// Like [`get_step_mut`](Self::get_step_mut) but reports unknown ids.
    pub fn step_mut(&mut self, id: &StepId) -> Result<&mut Step, PlanError> {
        self.get_step_mut(id)
            .ok_or_else(|| PlanError::UnknownStep(id.to_string()))
    }

    /// Every pending step whose dependencies are all completed, in insertion order.
    pub fn ready_steps(&self) -> Vec<&Step> {
        let statuses = self.status_index();
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .filter(|s| {
                s.depends_on
                    .iter()
                    .all(|dep| statuses.get(dep) == Some(&StepStatus::Completed))
            })
            .collect()
    }

    pub fn ready_step_ids(&self) -> Vec<StepId> {
        self.ready_steps().into_iter().map(|s| s.id.clone()).collect()
    }

    /// Pending steps that are not ready.
    pub fn blocked_steps(&self) -> Vec<&Step> {
        let ready: Vec<&StepId> = self.ready_steps().into_iter().map(|s| &s.id).collect();
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending && !ready.contains(&&s.id))
            .collect()
    }

    /// True iff every step is `Completed`, `Failed` or `Skipped`.
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_terminal())
    }

    /// Mark a pending step as skipped.
    pub fn skip_step(&mut self, id: &StepId) -> Result<(), PlanError> {
        self.step_mut(id)?.skip()
    }

    /// Check that all dependencies exist and that the graph is acyclic.
    pub fn validate(&self) -> Result<(), PlanError> {
        for step in &self.steps {
            for dep in &step.depends_on {
                if self.get_step(dep).is_none() {
                    return Err(PlanError::MissingDependency {
                        step: step.id.to_string(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }

        let mut indegree: HashMap<&StepId, usize> =
            self.steps.iter().map(|s| (&s.id, 0usize)).collect();
        let mut edges: HashMap<&StepId, Vec<&StepId>> = HashMap::new();
        for step in &self.steps {
            for dep in &step.depends_on {
                edges.entry(dep).or_default().push(&step.id);
                if let Some(d) = indegree.get_mut(&step.id) {
                    *d += 1;
                }
            }
        }

        let mut queue: VecDeque<&StepId> = self
            .steps
            .iter()
            .map(|s| &s.id)
            .filter(|id| indegree.get(id) == Some(&0))
            .collect();

        let mut visited = 0usize;
        while let Some(node) = queue.pop_front() {
            visited += 1;
            for next in edges.get(node).into_iter().flatten() {
                if let Some(entry) = indegree.get_mut(next) {
                    *entry -= 1;
                    if *entry == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }

        if visited != self.steps.len() {
            let steps = self
                .steps
                .iter()
                .filter(|s| indegree.get(&s.id).copied().unwrap_or(0) > 0)
                .map(|s| s.id.to_string())
                .collect();
            return Err(PlanError::CycleDetected { steps });
        }
        Ok(())
    }

    pub fn progress(&self) -> PlanProgress {
        let mut p = PlanProgress {
            total: self.steps.len(),
            ..PlanProgress::default()
        };
        for step in &self.steps {
            match step.status {
                StepStatus::Pending => p.pending += 1,
                StepStatus::Running => p.running += 1,
                StepStatus::Completed => p.completed += 1,
                StepStatus::Failed => p.failed += 1,
                StepStatus::Skipped => p.skipped += 1,
            }
        }
        p
    }

    /// First failed step in insertion order.
    pub fn first_failure(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    /// Human-readable summary with one status marker per step.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Plan: {}", self.task),
            format!("Steps: {}", self.steps.len()),
        ];
        for step in &self.steps {
            lines.push(format!(
                "  [{}] {}: {}",
                step.status.icon(),
                step.id,
                step.description
            ));
        }
        lines.join("\n")
    }

    fn status_index(&self) -> HashMap<&StepId, StepStatus> {
        self.steps.iter().map(|s| (&s.id, s.status)).collect()
    }
}
