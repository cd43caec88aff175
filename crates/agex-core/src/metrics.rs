//! Global atomic counters for AGEX observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a task).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters. Read-only for behavior: nothing branches on them.
pub struct Metrics {
    steps_dispatched: AtomicU64,
    retries: AtomicU64,
    recoveries: AtomicU64,
    sandbox_runs: AtomicU64,
    timeouts: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            steps_dispatched: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            recoveries: AtomicU64::new(0),
            sandbox_runs: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    pub fn inc_steps_dispatched(&self) {
        self.steps_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "steps_dispatched", "counter incremented");
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "retries", "counter incremented");
    }

    /// Recovery steps appended by substitution.
    pub fn inc_recoveries(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "recoveries", "counter incremented");
    }

    pub fn inc_sandbox_runs(&self) {
        self.sandbox_runs.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sandbox_runs", "counter incremented");
    }

    /// Sandbox executions killed at the deadline.
    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "timeouts", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            steps_dispatched = self.steps_dispatched(),
            retries = self.retries(),
            recoveries = self.recoveries(),
            sandbox_runs = self.sandbox_runs(),
            timeouts = self.timeouts(),
        );
    }

    pub fn steps_dispatched(&self) -> u64 {
        self.steps_dispatched.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn recoveries(&self) -> u64 {
        self.recoveries.load(Ordering::Relaxed)
    }

    pub fn sandbox_runs(&self) -> u64 {
        self.sandbox_runs.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.steps_dispatched.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);
        self.recoveries.store(0, Ordering::Relaxed);
        self.sandbox_runs.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
    }
}
