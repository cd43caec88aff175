//! Capability registry and builtin tools through the public surface.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use agex_core::{
    classify_failure, Capability, CapabilityRegistry, FailureClass, ParamSpec, ParamType, Params,
    RegistryError, ToolResult, ToolStatus, ToolsConfig,
};

fn params(pairs: &[(&str, serde_json::Value)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn sandboxed_tools(dir: &std::path::Path) -> CapabilityRegistry {
    let config = ToolsConfig {
        allowed_paths: vec![dir.to_path_buf()],
        search_paths: vec![dir.to_path_buf()],
        ..ToolsConfig::default()
    };
    CapabilityRegistry::with_defaults(&config)
}

struct Echo;

#[async_trait]
impl Capability for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Returns the text parameter"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("text", ParamType::String, "Text to echo")]
    }

    async fn invoke(&self, params: &Params) -> ToolResult {
        ToolResult::success(params["text"].as_str().unwrap_or_default())
    }
}

struct Sleeper;

#[async_trait]
impl Capability for Sleeper {
    fn name(&self) -> &str {
        "sleeper"
    }

    fn description(&self) -> &str {
        "Never finishes in time"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    async fn invoke(&self, _params: &Params) -> ToolResult {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        ToolResult::success("late")
    }
}

#[test]
fn default_registry_exposes_builtin_schemas() {
    let registry = CapabilityRegistry::with_defaults(&ToolsConfig::default());
    assert_eq!(
        registry.names(),
        vec!["file_read", "file_write", "search", "shell"]
    );

    let schemas = registry.schemas();
    assert_eq!(schemas.len(), 4);
    let shell = schemas.iter().find(|s| s["name"] == "shell").unwrap();
    assert_eq!(shell["parameters"]["type"], "object");
    assert_eq!(shell["parameters"]["required"], json!(["command"]));
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut registry = CapabilityRegistry::new();
    registry.register(Echo).unwrap();
    let err = registry.register(Echo).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateTool { .. }));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn registry_validates_before_invoking() {
    let mut registry = CapabilityRegistry::new();
    registry.register(Echo).unwrap();

    let ok = registry.execute("echo", &params(&[("text", json!("hi"))])).await;
    assert_eq!(ok.output, "hi");

    let missing = registry.execute("echo", &Params::new()).await;
    assert_eq!(missing.status, ToolStatus::Error);
    assert_eq!(missing.error_message(), "Missing required parameter: text");
    assert_eq!(classify_failure(&missing), FailureClass::Validation);

    let unknown = registry.execute("nope", &Params::new()).await;
    assert_eq!(unknown.error_message(), "Unknown tool: nope");
}

#[tokio::test(start_paused = true)]
async fn invoke_timeout_bounds_slow_tools() {
    let mut registry = CapabilityRegistry::new().with_invoke_timeout(Duration::from_millis(250));
    registry.register(Sleeper).unwrap();

    let result = registry.execute("sleeper", &Params::new()).await;
    assert_eq!(result.status, ToolStatus::Timeout);
    assert_eq!(result.error_message(), "Tool 'sleeper' timed out after 250ms");
    assert_eq!(classify_failure(&result), FailureClass::Timeout);
}

#[tokio::test]
async fn file_tools_write_append_and_read() {
    let dir = tempfile::tempdir().unwrap();
    let registry = sandboxed_tools(dir.path());
    let path = dir.path().join("sub/dir/log.txt");
    let path_str = path.to_string_lossy().into_owned();

    let written = registry
        .execute(
            "file_write",
            &params(&[("path", json!(path_str)), ("content", json!("one\n"))]),
        )
        .await;
    assert!(written.is_success(), "{}", written.error_message());
    assert!(written.output.starts_with("Successfully wrote 4 bytes"));

    registry
        .execute(
            "file_write",
            &params(&[
                ("path", json!(path_str)),
                ("content", json!("two\n")),
                ("mode", json!("append")),
            ]),
        )
        .await;

    let read = registry
        .execute("file_read", &params(&[("path", json!(path_str))]))
        .await;
    assert_eq!(read.output, "one\ntwo\n");
}

#[tokio::test]
async fn file_access_outside_allowed_roots_is_denied() {
    let allowed = tempfile::tempdir().unwrap();
    let other = tempfile::tempdir().unwrap();
    let secret = other.path().join("secret.txt");
    std::fs::write(&secret, "s3cret").unwrap();
    let registry = sandboxed_tools(allowed.path());

    let result = registry
        .execute("file_read", &params(&[("path", json!(secret.to_string_lossy()))]))
        .await;
    assert_eq!(result.status, ToolStatus::PermissionDenied);
    assert_eq!(classify_failure(&result), FailureClass::Access);

    let sneaky = allowed.path().join("..").join(other.path().file_name().unwrap());
    let result = registry
        .execute(
            "file_read",
            &params(&[("path", json!(sneaky.join("secret.txt").to_string_lossy()))]),
        )
        .await;
    assert_eq!(result.status, ToolStatus::PermissionDenied);
}

#[tokio::test]
async fn missing_file_is_classified_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let registry = sandboxed_tools(dir.path());
    let result = registry
        .execute(
            "file_read",
            &params(&[("path", json!(dir.path().join("absent").to_string_lossy()))]),
        )
        .await;
    assert!(result.error_message().starts_with("File not found"));
    assert_eq!(classify_failure(&result), FailureClass::NotFound);
}

#[tokio::test]
async fn search_finds_matches_and_honors_file_pattern() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.rs"), "fn main() {}\n// TODO: tidy\n").unwrap();
    std::fs::write(dir.path().join("b.txt"), "todo list\n").unwrap();
    let registry = sandboxed_tools(dir.path());

    let all = registry
        .execute("search", &params(&[("pattern", json!("todo"))]))
        .await;
    assert!(all.is_success());
    assert_eq!(all.output.lines().count(), 2);

    let rust_only = registry
        .execute(
            "search",
            &params(&[("pattern", json!("todo")), ("file_pattern", json!("*.rs"))]),
        )
        .await;
    assert_eq!(rust_only.output.lines().count(), 1);
    assert!(rust_only.output.contains("a.rs:2:"));

    let none = registry
        .execute("search", &params(&[("pattern", json!("zzz-nothing"))]))
        .await;
    assert_eq!(none.output, "No matches found");

    let invalid = registry
        .execute("search", &params(&[("pattern", json!("("))]))
        .await;
    assert!(invalid.error_message().starts_with("Invalid regex"));
}

#[cfg(unix)]
#[tokio::test]
async fn shell_runs_commands_and_blocks_denylisted_ones() {
    let registry = CapabilityRegistry::with_defaults(&ToolsConfig::default());

    let ok = registry
        .execute("shell", &params(&[("command", json!("echo out; echo err >&2"))]))
        .await;
    assert!(ok.is_success());
    assert!(ok.output.starts_with("out\n"));
    assert!(ok.output.contains("[stderr]: err"));
    assert_eq!(ok.metadata["returncode"], json!(0));

    let blocked = registry
        .execute("shell", &params(&[("command", json!("mkfs.ext4 /dev/null"))]))
        .await;
    assert_eq!(blocked.status, ToolStatus::PermissionDenied);
    assert_eq!(classify_failure(&blocked), FailureClass::CapabilityDenied);

    let slow = registry
        .execute(
            "shell",
            &params(&[("command", json!("sleep 5")), ("timeout", json!(1))]),
        )
        .await;
    assert_eq!(slow.status, ToolStatus::Timeout);
    assert_eq!(slow.error_message(), "Command timed out after 1s");
}
