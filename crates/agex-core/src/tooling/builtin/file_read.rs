use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::step::Params;
use crate::recovery::FailureClass;
use crate::tooling::capability::{param_str, Capability, ParamSpec, ParamType, ToolResult};
use crate::tooling::policy::PathPolicy;

/// Reads a text file under the allowed roots.
#[derive(Debug, Clone)]
pub struct FileReadTool {
    policy: PathPolicy,
}

impl FileReadTool {
    pub fn new(allowed_paths: &[PathBuf]) -> Self {
        Self {
            policy: PathPolicy::new(allowed_paths),
        }
    }
}

#[async_trait]
impl Capability for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("path", ParamType::String, "Path to the file to read"),
            ParamSpec::optional("encoding", ParamType::String, "File encoding", "utf-8"),
        ]
    }

    async fn invoke(&self, params: &Params) -> ToolResult {
        let Some(raw) = param_str(params, "path") else {
            return ToolResult::error("Parameter 'path' must be a string")
                .with_error_kind(FailureClass::Validation.as_str());
        };
        let encoding = param_str(params, "encoding").unwrap_or("utf-8");
        if !matches!(encoding.to_ascii_lowercase().as_str(), "utf-8" | "utf8") {
            return ToolResult::error(format!("Unsupported encoding: {encoding}"))
                .with_error_kind(FailureClass::Validation.as_str());
        }

        let path = Path::new(raw);
        if !self.policy.is_allowed(path) {
            return ToolResult::permission_denied(format!("Access to {raw} is not allowed"));
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return ToolResult::error(format!("File not found: {raw}"))
                    .with_error_kind(FailureClass::NotFound.as_str());
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return ToolResult::permission_denied(format!("Permission denied: {raw}"));
            }
            Err(e) => return ToolResult::error(format!("Error reading {raw}: {e}")),
        };

        let size = bytes.len();
        match String::from_utf8(bytes) {
            Ok(content) => ToolResult::success(content)
                .with_metadata("path", raw)
                .with_metadata("size", size),
            Err(_) => ToolResult::error(format!("File is not valid UTF-8: {raw}")),
        }
    }
}
