//! Error types for the sandbox module.
//!
//! Only infrastructure faults are errors here. A fragment that fails, times
//! out or trips the denylist is reported through [`super::SandboxResult`].

use std::path::PathBuf;

/// Errors produced while preparing a sandbox.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to prepare sandbox scratch area {path:?}: {source}")]
    Setup {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),
}
