//! Capability registry: explicit registration, fail-closed dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::builtin::{FileReadTool, FileWriteTool, SearchTool, ShellTool};
use super::capability::{Capability, ToolResult};
use super::config::ToolsConfig;
use super::error::RegistryError;
use crate::domain::step::Params;
use crate::recovery::FailureClass;

/// Name-keyed set of capabilities.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    tools: BTreeMap<String, Arc<dyn Capability>>,
    invoke_timeout: Option<Duration>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("tools", &self.names())
            .field("invoke_timeout", &self.invoke_timeout)
            .finish()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the builtin `file_read`, `file_write`, `shell` and
    /// `search` tools.
    pub fn with_defaults(config: &ToolsConfig) -> Self {
        let mut registry = Self::new();
        let builtins: [Arc<dyn Capability>; 4] = [
            Arc::new(FileReadTool::new(&config.allowed_paths)),
            Arc::new(FileWriteTool::new(&config.allowed_paths)),
            Arc::new(ShellTool::new(config.shell.clone())),
            Arc::new(SearchTool::new(config.search_paths.clone())),
        ];
        for tool in builtins {
            registry.tools.insert(tool.name().to_string(), tool);
        }
        registry
    }

    /// Bound every invocation by `timeout`; overruns become `timeout` results.
    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = Some(timeout);
        self
    }

    pub fn register<C: Capability>(&mut self, capability: C) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(capability))
    }

    pub fn register_arc(&mut self, capability: Arc<dyn Capability>) -> Result<(), RegistryError> {
        let name = capability.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateTool { tool_name: name });
        }
        self.tools.insert(name, capability);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn schemas(&self) -> Vec<Value> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up, validate and invoke. Never panics on bad input: unknown
    /// tools and missing parameters come back as `error` results.
    pub async fn execute(&self, name: &str, params: &Params) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::error(format!("Unknown tool: {name}"))
                .with_error_kind(FailureClass::Validation.as_str());
        };

        if let Err(message) = tool.validate_params(params) {
            return ToolResult::error(message).with_error_kind(FailureClass::Validation.as_str());
        }

        debug!(tool = name, "invoking capability");
        match self.invoke_timeout {
            Some(limit) => match tokio::time::timeout(limit, tool.invoke(params)).await {
                Ok(result) => result,
                Err(_) => ToolResult::timeout(format!(
                    "Tool '{name}' timed out after {}ms",
                    limit.as_millis()
                )),
            },
            None => tool.invoke(params).await,
        }
    }
}
