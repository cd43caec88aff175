//! Capability contract: what every tool exposes to the registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::step::Params;

/// Metadata key carrying a machine-readable failure category.
pub const ERROR_KIND_KEY: &str = "error_kind";

/// Outcome status of one capability invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    Timeout,
    PermissionDenied,
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::PermissionDenied => "permission_denied",
        };
        f.write_str(s)
    }
}

/// Immutable result of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub output: String,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Params,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            output: output.into(),
            error: None,
            metadata: Params::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::failure(ToolStatus::Error, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::failure(ToolStatus::Timeout, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::failure(ToolStatus::PermissionDenied, message)
    }

    /// A failure with the given status and message.
    pub fn failure(status: ToolStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            output: String::new(),
            error: Some(message.into()),
            metadata: Params::new(),
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Tag the failure category consumed by the recovery controller.
    pub fn with_error_kind(self, kind: &str) -> Self {
        self.with_metadata(ERROR_KIND_KEY, kind)
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    pub fn error_kind(&self) -> Option<&str> {
        self.metadata.get(ERROR_KIND_KEY).and_then(Value::as_str)
    }

    /// The error text, falling back to a generic message.
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| format!("tool finished with status {}", self.status))
    }
}

/// Primitive type tag of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Declared parameter of a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: true,
            default: None,
        }
    }

    pub fn optional(
        name: &str,
        param_type: ParamType,
        description: &str,
        default: impl Into<Value>,
    ) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: false,
            default: Some(default.into()),
        }
    }
}

/// A named, schema-described action the orchestration loop can invoke.
#[async_trait]
pub trait Capability: Send + Sync + 'static {
    /// Stable identifier used for registry lookup.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ParamSpec>;

    /// Execute with an already-validated parameter bag.
    async fn invoke(&self, params: &Params) -> ToolResult;

    /// Reject a bag that lacks any required parameter.
    fn validate_params(&self, params: &Params) -> Result<(), String> {
        for param in self.parameters() {
            if param.required && !params.contains_key(&param.name) {
                return Err(format!("Missing required parameter: {}", param.name));
            }
        }
        Ok(())
    }

    /// Function-calling schema for this capability.
    fn schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in self.parameters() {
            let mut prop = json!({
                "type": param.param_type,
                "description": param.description,
            });
            if let Some(default) = &param.default {
                prop["default"] = default.clone();
            }
            if param.required {
                required.push(param.name.clone());
            }
            properties.insert(param.name, prop);
        }
        json!({
            "name": self.name(),
            "description": self.description(),
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        })
    }
}

/// String parameter lookup.
pub fn param_str<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

/// Non-negative integer parameter lookup; accepts numeric strings.
pub fn param_u64(params: &Params, key: &str) -> Option<u64> {
    match params.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
