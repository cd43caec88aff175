//! Configuration for the builtin tool set.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Settings consumed by [`super::CapabilityRegistry::with_defaults`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Roots that `file_read` and `file_write` may touch.
    pub allowed_paths: Vec<PathBuf>,
    /// Roots walked by `search`.
    pub search_paths: Vec<PathBuf>,
    pub shell: ShellConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allowed_paths: vec![PathBuf::from(".")],
            search_paths: vec![PathBuf::from(".")],
            shell: ShellConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Substrings that reject a command outright.
    pub blocked_commands: Vec<String>,
    /// When set, a command must start with one of these prefixes.
    pub allowed_commands: Option<Vec<String>>,
    pub default_timeout_secs: u64,
    pub working_dir: Option<PathBuf>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            blocked_commands: vec!["rm -rf /".into(), "mkfs".into(), "dd if=".into()],
            allowed_commands: None,
            default_timeout_secs: 30,
            working_dir: None,
        }
    }
}
