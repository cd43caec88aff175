use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::domain::step::Params;
use crate::recovery::FailureClass;
use crate::tooling::capability::{param_str, Capability, ParamSpec, ParamType, ToolResult};
use crate::tooling::policy::PathPolicy;

/// Writes or appends text to a file under the allowed roots.
#[derive(Debug, Clone)]
pub struct FileWriteTool {
    policy: PathPolicy,
}

impl FileWriteTool {
    pub fn new(allowed_paths: &[PathBuf]) -> Self {
        Self {
            policy: PathPolicy::new(allowed_paths),
        }
    }
}

#[async_trait]
impl Capability for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("path", ParamType::String, "Path to the file to write"),
            ParamSpec::required("content", ParamType::String, "Content to write"),
            ParamSpec::optional(
                "mode",
                ParamType::String,
                "Write mode: overwrite or append",
                "overwrite",
            ),
        ]
    }

    async fn invoke(&self, params: &Params) -> ToolResult {
        let (Some(raw), Some(content)) = (param_str(params, "path"), param_str(params, "content"))
        else {
            return ToolResult::error("Parameters 'path' and 'content' must be strings")
                .with_error_kind(FailureClass::Validation.as_str());
        };
        let append = match param_str(params, "mode").unwrap_or("overwrite") {
            "overwrite" => false,
            "append" => true,
            other => {
                return ToolResult::error(format!("Unsupported write mode: {other}"))
                    .with_error_kind(FailureClass::Validation.as_str());
            }
        };

        let path = Path::new(raw);
        if !self.policy.is_allowed(path) {
            return ToolResult::permission_denied(format!("Access to {raw} is not allowed"));
        }

        match write(path, content.as_bytes(), append).await {
            Ok(()) => ToolResult::success(format!(
                "Successfully wrote {} bytes to {raw}",
                content.len()
            ))
            .with_metadata("path", raw)
            .with_metadata("size", content.len()),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                ToolResult::permission_denied(format!("Permission denied: {raw}"))
            }
            Err(e) => ToolResult::error(format!("Error writing {raw}: {e}")),
        }
    }
}

async fn write(path: &Path, bytes: &[u8], append: bool) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tooling::capability::ToolStatus;

    fn params(path: &Path, content: &str, mode: Option<&str>) -> Params {
        let mut p = Params::new();
        p.insert("path".into(), json!(path.to_string_lossy()));
        p.insert("content".into(), json!(content));
        if let Some(mode) = mode {
            p.insert("mode".into(), json!(mode));
        }
        p
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested/deeper/out.txt");
        let tool = FileWriteTool::new(&[dir.path().to_path_buf()]);

        let result = tool.invoke(&params(&file, "abc", None)).await;
        assert!(result.is_success(), "{result:?}");
        assert!(result.output.starts_with("Successfully wrote 3 bytes to"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_append_mode() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("log.txt");
        std::fs::write(&file, "one\n").unwrap();
        let tool = FileWriteTool::new(&[dir.path().to_path_buf()]);

        tool.invoke(&params(&file, "two\n", Some("append"))).await;
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_write_outside_root_denied() {
        let allowed = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let file = other.path().join("x.txt");
        let tool = FileWriteTool::new(&[allowed.path().to_path_buf()]);

        let result = tool.invoke(&params(&file, "x", None)).await;
        assert_eq!(result.status, ToolStatus::PermissionDenied);
        assert!(!file.exists());
    }
}
