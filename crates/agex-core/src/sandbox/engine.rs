//! `CodeSandbox`: runs untrusted fragments in fresh, bounded processes.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::config::{SandboxConfig, WrapMode};
use super::error::SandboxError;
use super::process::{run_with_deadline, CapturedOutput, RunOutcome};
use super::result::{SandboxResult, SandboxStatus};
use super::wrapper;
use crate::metrics::METRICS;

const SCRATCH_PREFIX: &str = "agex_sandbox_";

#[derive(Debug)]
enum Scratch {
    /// Removed on release or drop.
    Temp(TempDir),
    /// Configured directory; left in place.
    Persistent(PathBuf),
}

/// One sandbox instance owning a scratch directory.
///
/// The scratch area is removed by [`CodeSandbox::release`], and by `Drop`
/// when the instance goes out of scope on any other path.
#[derive(Debug)]
pub struct CodeSandbox {
    config: SandboxConfig,
    scratch: Scratch,
}

impl CodeSandbox {
    /// Validate `config` and create the scratch area.
    pub fn acquire(config: SandboxConfig) -> Result<Self, SandboxError> {
        config.validate()?;
        let scratch = match &config.working_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|source| SandboxError::Setup {
                    path: Some(dir.clone()),
                    source,
                })?;
                Scratch::Persistent(dir.clone())
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix(SCRATCH_PREFIX)
                    .tempdir()
                    .map_err(|source| SandboxError::Setup { path: None, source })?;
                Scratch::Temp(dir)
            }
        };
        debug!(dir = %scratch_path(&scratch).display(), "sandbox acquired");
        Ok(Self { config, scratch })
    }

    /// Acquire, run `f`, and release on every path.
    pub async fn scoped<F, Fut, T>(config: SandboxConfig, f: F) -> Result<T, SandboxError>
    where
        F: FnOnce(Arc<CodeSandbox>) -> Fut,
        Fut: Future<Output = T>,
    {
        let sandbox = Arc::new(Self::acquire(config)?);
        let out = f(Arc::clone(&sandbox)).await;
        // A clone kept by the caller defers cleanup to the last drop.
        if let Ok(sandbox) = Arc::try_unwrap(sandbox) {
            sandbox.release();
        }
        Ok(out)
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Directory the fragment runs in.
    pub fn scratch_dir(&self) -> &Path {
        scratch_path(&self.scratch)
    }

    /// Remove the scratch area now. Persistent directories are kept.
    pub fn release(self) {
        match self.scratch {
            Scratch::Temp(dir) => {
                let path = dir.path().to_path_buf();
                if let Err(e) = dir.close() {
                    warn!(dir = %path.display(), error = %e, "failed to remove sandbox scratch area");
                }
            }
            Scratch::Persistent(dir) => {
                debug!(dir = %dir.display(), "persistent sandbox directory kept");
            }
        }
    }

    /// Run `code` under the configured limits.
    pub async fn execute(&self, code: &str) -> SandboxResult {
        METRICS.inc_sandbox_runs();

        if let Some(marker) = self.config.blocked_marker(code) {
            warn!(marker, "sandbox denylist hit");
            return SandboxResult::denied(marker);
        }

        let interpreter = &self.config.interpreter;
        let unit = self.scratch_dir().join(format!(
            "agex_unit_{}.{}",
            uuid::Uuid::new_v4().simple(),
            interpreter.file_extension
        ));
        if let Err(e) = tokio::fs::write(&unit, wrapper::render(interpreter, code)).await {
            return SandboxResult::failed(format!("Failed to write execution unit: {e}"));
        }

        let mut cmd = Command::new(&interpreter.program);
        cmd.args(&interpreter.args)
            .arg(&unit)
            .current_dir(self.scratch_dir());

        let limit = Duration::from_millis(self.config.timeout_ms);
        let started = Instant::now();
        let outcome = run_with_deadline(cmd, limit).await;
        let elapsed = started.elapsed();

        if let Err(e) = tokio::fs::remove_file(&unit).await {
            debug!(unit = %unit.display(), error = %e, "execution unit already removed");
        }

        let result = match outcome {
            Err(e) => SandboxResult::failed(format!(
                "Failed to launch {}: {e}",
                interpreter.program
            )),
            Ok(RunOutcome::TimedOut) => {
                METRICS.inc_timeouts();
                SandboxResult::timed_out(limit)
            }
            Ok(RunOutcome::Exited(out)) => self.collect(out, elapsed),
        };
        info!(
            status = %result.status,
            elapsed_ms = result.execution_time.as_millis() as u64,
            "sandbox execution finished"
        );
        result
    }

    /// Read `path` and execute its contents.
    pub async fn execute_file(&self, path: &Path) -> SandboxResult {
        match tokio::fs::read_to_string(path).await {
            Ok(code) => self.execute(&code).await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                SandboxResult::failed(format!("File not found: {}", path.display()))
            }
            Err(e) => SandboxResult::failed(format!("Failed to read {}: {e}", path.display())),
        }
    }

    fn collect(&self, out: CapturedOutput, elapsed: Duration) -> SandboxResult {
        let raw_stdout = String::from_utf8_lossy(&out.stdout).into_owned();
        let raw_stderr = String::from_utf8_lossy(&out.stderr).into_owned();

        let structured = match self.config.interpreter.wrap {
            WrapMode::PythonJson => wrapper::parse_structured(&raw_stdout),
            WrapMode::Raw => None,
        };
        let is_structured = structured.is_some();

        let (stdout, stderr, had_error) = match structured {
            Some(payload) => {
                let mut stderr = payload.stderr;
                if let Some(error) = &payload.error {
                    if !stderr.is_empty() && !stderr.ends_with('\n') {
                        stderr.push('\n');
                    }
                    stderr.push_str(error);
                }
                (payload.stdout, stderr, payload.error.is_some())
            }
            None => (raw_stdout, raw_stderr, false),
        };

        let status = if out.status.success() && !had_error {
            SandboxStatus::Completed
        } else {
            SandboxStatus::Error
        };

        let max = self.config.max_output_bytes;
        let stdout_bytes = stdout.len();
        let stderr_bytes = stderr.len();
        let (stdout, stdout_truncated) = wrapper::truncate(stdout, max);
        let (stderr, stderr_truncated) = wrapper::truncate(stderr, max);

        let mut result = SandboxResult::new(status, stdout, stderr, elapsed);
        let meta = &mut result.metadata;
        meta.insert("exit_code".into(), out.status.code().into());
        meta.insert("structured".into(), is_structured.into());
        meta.insert("stdout_bytes".into(), stdout_bytes.into());
        meta.insert("stderr_bytes".into(), stderr_bytes.into());
        meta.insert("stdout_truncated".into(), stdout_truncated.into());
        meta.insert("stderr_truncated".into(), stderr_truncated.into());
        result
    }
}

fn scratch_path(scratch: &Scratch) -> &Path {
    match scratch {
        Scratch::Temp(dir) => dir.path(),
        Scratch::Persistent(dir) => dir,
    }
}
