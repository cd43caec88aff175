//! Sandbox limits, denylist and interpreter selection.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::SandboxError;

/// Markers rejected before anything is spawned.
pub const DEFAULT_BLOCKED_CAPABILITIES: &[&str] = &[
    "os.system",
    "subprocess",
    "socket",
    "requests",
    "urllib",
    "ftplib",
    "telnetlib",
    "smtplib",
];

/// How a fragment is turned into the file handed to the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapMode {
    /// Embed the fragment in a harness that prints one JSON object
    /// `{"stdout", "stderr", "error"}`.
    PythonJson,
    /// Run the fragment as-is and use the raw streams.
    Raw,
}

/// Program used to run the execution unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpreter {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub file_extension: String,
    pub wrap: WrapMode,
}

impl Interpreter {
    pub fn python() -> Self {
        Self {
            program: "python3".to_string(),
            args: Vec::new(),
            file_extension: "py".to_string(),
            wrap: WrapMode::PythonJson,
        }
    }

    pub fn shell() -> Self {
        Self {
            program: "sh".to_string(),
            args: Vec::new(),
            file_extension: "sh".to_string(),
            wrap: WrapMode::Raw,
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::python()
    }
}

/// Configuration for one sandbox instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock limit per execution (milliseconds).
    pub timeout_ms: u64,
    /// Advisory only; not enforced by this backend.
    pub max_memory_mb: u64,
    /// Per-stream cap before truncation.
    pub max_output_bytes: usize,
    /// Substrings that reject a fragment outright. A textual heuristic,
    /// trivially bypassable, not a security boundary.
    pub blocked_capabilities: Vec<String>,
    /// Persistent scratch directory, kept on release.
    pub working_dir: Option<PathBuf>,
    pub interpreter: Interpreter,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_memory_mb: 256,
            max_output_bytes: 1024 * 1024,
            blocked_capabilities: DEFAULT_BLOCKED_CAPABILITIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            working_dir: None,
            interpreter: Interpreter::default(),
        }
    }
}

impl SandboxConfig {
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_interpreter(mut self, interpreter: Interpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn validate(&self) -> Result<(), SandboxError> {
        if self.timeout_ms == 0 {
            return Err(SandboxError::InvalidConfig(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_output_bytes == 0 {
            return Err(SandboxError::InvalidConfig(
                "max_output_bytes must be greater than zero".to_string(),
            ));
        }
        if self.interpreter.program.trim().is_empty() {
            return Err(SandboxError::InvalidConfig(
                "interpreter program must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// First blocked marker contained in `code`, if any.
    pub fn blocked_marker(&self, code: &str) -> Option<&str> {
        self.blocked_capabilities
            .iter()
            .map(String::as_str)
            .find(|marker| !marker.is_empty() && code.contains(marker))
    }
}
