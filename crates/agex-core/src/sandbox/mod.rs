//! Sandbox: isolated execution of untrusted code fragments.
//!
//! Each execution runs in a fresh process, in its own process group, inside
//! a scratch directory owned by the [`CodeSandbox`]. Limits are a wall-clock
//! deadline (hard kill of the group), a per-stream output cap, and a textual
//! capability denylist checked before anything is spawned. The memory
//! ceiling is accepted for compatibility but not enforced.
//!
//! # Modules
//!
//! - [`config`]  : `SandboxConfig`, `Interpreter`, `WrapMode`
//! - [`engine`]  : `CodeSandbox` (acquire / execute / release)
//! - [`result`]  : `SandboxResult`, `SandboxStatus`
//! - [`wrapper`] : execution-unit rendering, payload parsing, truncation
//! - [`error`]   : `SandboxError`

pub mod config;
pub mod engine;
pub mod error;
pub(crate) mod process;
pub mod result;
pub mod wrapper;

pub use config::{Interpreter, SandboxConfig, WrapMode, DEFAULT_BLOCKED_CAPABILITIES};
pub use engine::CodeSandbox;
pub use error::SandboxError;
pub use result::{SandboxResult, SandboxStatus};
