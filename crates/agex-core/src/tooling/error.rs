//! Error types for capability registration.

use thiserror::Error;

/// Registration failures. Invocation failures are [`super::ToolResult`] data.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate tool registration: {tool_name}")]
    DuplicateTool { tool_name: String },
}
