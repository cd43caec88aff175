//! Access policies shared by the builtin tools.
//!
//! Path checks are lexical: a path is normalized against the current
//! directory (no symlink resolution) and must fall under one of the allowed
//! roots. Command checks are substring/prefix matches over the raw command
//! text.

use std::path::{Component, Path, PathBuf};

/// Allowed filesystem roots for file tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPolicy {
    roots: Vec<PathBuf>,
}

impl PathPolicy {
    pub fn new(roots: &[PathBuf]) -> Self {
        Self {
            roots: roots.iter().map(|r| normalize(r)).collect(),
        }
    }

    /// Whether `path` lies under one of the allowed roots.
    pub fn is_allowed(&self, path: &Path) -> bool {
        let candidate = normalize(path);
        self.roots.iter().any(|root| candidate.starts_with(root))
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

/// Shell command admission rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandPolicy {
    blocked: Vec<String>,
    allowed_prefixes: Option<Vec<String>>,
}

impl CommandPolicy {
    pub fn new(blocked: Vec<String>, allowed_prefixes: Option<Vec<String>>) -> Self {
        Self {
            blocked,
            allowed_prefixes,
        }
    }

    /// Blocked substrings win; otherwise an allow-list, when set, must match.
    pub fn is_allowed(&self, command: &str) -> bool {
        if self.blocked.iter().any(|b| command.contains(b.as_str())) {
            return false;
        }
        match &self.allowed_prefixes {
            Some(prefixes) => {
                let trimmed = command.trim_start();
                prefixes.iter().any(|p| trimmed.starts_with(p.as_str()))
            }
            None => true,
        }
    }
}

/// Absolute, lexically normalized form of `path`.
pub fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
