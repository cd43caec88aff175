//! Tooling: the capability contract, the registry, and the builtin tools.
//!
//! # Modules
//!
//! - [`capability`] : `Capability` trait, `ToolResult`, `ParamSpec`
//! - [`registry`]   : `CapabilityRegistry` (explicit registration, fail-closed dispatch)
//! - [`config`]     : `ToolsConfig`, `ShellConfig`
//! - [`policy`]     : path roots and command admission
//! - [`builtin`]    : `file_read`, `file_write`, `shell`, `search`
//! - [`error`]      : `RegistryError`

pub mod builtin;
pub mod capability;
pub mod config;
pub mod error;
pub mod policy;
pub mod registry;

pub use capability::{Capability, ParamSpec, ParamType, ToolResult, ToolStatus};
pub use config::{ShellConfig, ToolsConfig};
pub use error::RegistryError;
pub use registry::CapabilityRegistry;
