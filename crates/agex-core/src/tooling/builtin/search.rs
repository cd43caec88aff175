use std::path::PathBuf;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use walkdir::{DirEntry, WalkDir};

use crate::domain::step::Params;
use crate::recovery::FailureClass;
use crate::tooling::capability::{param_str, param_u64, Capability, ParamSpec, ParamType, ToolResult};

const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules", "__pycache__"];

/// Case-insensitive regex search over files below the configured roots.
#[derive(Debug, Clone)]
pub struct SearchTool {
    roots: Vec<PathBuf>,
}

impl SearchTool {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

#[derive(Debug, Default)]
struct SearchReport {
    matches: Vec<String>,
    files_searched: usize,
}

#[async_trait]
impl Capability for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search for a pattern in files"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("pattern", ParamType::String, "Regex pattern to search for"),
            ParamSpec::optional("file_pattern", ParamType::String, "Glob for file names", "*"),
            ParamSpec::optional("max_results", ParamType::Integer, "Maximum matches", 50),
        ]
    }

    async fn invoke(&self, params: &Params) -> ToolResult {
        let Some(pattern) = param_str(params, "pattern") else {
            return ToolResult::error("Parameter 'pattern' must be a string")
                .with_error_kind(FailureClass::Validation.as_str());
        };
        let regex = match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => re,
            Err(e) => {
                return ToolResult::error(format!("Invalid regex: {e}"))
                    .with_error_kind(FailureClass::Validation.as_str());
            }
        };
        let file_pattern = param_str(params, "file_pattern").unwrap_or("*");
        let glob = match glob::Pattern::new(file_pattern) {
            Ok(g) => g,
            Err(e) => {
                return ToolResult::error(format!("Invalid file pattern: {e}"))
                    .with_error_kind(FailureClass::Validation.as_str());
            }
        };
        let max_results = param_u64(params, "max_results").unwrap_or(50) as usize;

        let roots = self.roots.clone();
        let report =
            tokio::task::spawn_blocking(move || walk(&roots, &regex, &glob, max_results)).await;
        let report = match report {
            Ok(report) => report,
            Err(e) => return ToolResult::error(format!("Search task failed: {e}")),
        };

        let output = if report.matches.is_empty() {
            "No matches found".to_string()
        } else {
            report.matches.join("\n")
        };
        ToolResult::success(output)
            .with_metadata("matches", report.matches.len())
            .with_metadata("files_searched", report.files_searched)
    }
}

fn walk(roots: &[PathBuf], regex: &Regex, glob: &glob::Pattern, max_results: usize) -> SearchReport {
    let mut report = SearchReport::default();
    for root in roots {
        let entries = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file());

        for entry in entries {
            if !glob.matches(&entry.file_name().to_string_lossy()) {
                continue;
            }
            // Binary and unreadable files are skipped silently.
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            report.files_searched += 1;
            for (idx, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    report.matches.push(format!(
                        "{}:{}: {}",
                        entry.path().display(),
                        idx + 1,
                        line.trim()
                    ));
                    if report.matches.len() >= max_results {
                        return report;
                    }
                }
            }
        }
    }
    report
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && SKIPPED_DIRS
            .iter()
            .any(|name| entry.file_name().to_string_lossy() == *name)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main() {}\nlet Needle = 1;\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "needle in text\n").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config"), "needle hidden\n").unwrap();
        dir
    }

    fn params(pattern: &str, file_pattern: Option<&str>) -> Params {
        let mut p = Params::new();
        p.insert("pattern".into(), json!(pattern));
        if let Some(fp) = file_pattern {
            p.insert("file_pattern".into(), json!(fp));
        }
        p
    }

    #[tokio::test]
    async fn test_case_insensitive_with_line_numbers() {
        let dir = fixture();
        let tool = SearchTool::new(vec![dir.path().to_path_buf()]);
        let result = tool.invoke(&params("needle", None)).await;
        assert!(result.is_success());
        assert_eq!(result.metadata["matches"], json!(2));
        assert!(result.output.contains("a.rs:2: let Needle = 1;"));
        assert!(!result.output.contains("hidden"));
    }

    #[tokio::test]
    async fn test_file_pattern_filters() {
        let dir = fixture();
        let tool = SearchTool::new(vec![dir.path().to_path_buf()]);
        let result = tool.invoke(&params("needle", Some("*.txt"))).await;
        assert_eq!(result.metadata["matches"], json!(1));
        assert_eq!(result.metadata["files_searched"], json!(1));
    }

    #[tokio::test]
    async fn test_no_matches_message() {
        let dir = fixture();
        let tool = SearchTool::new(vec![dir.path().to_path_buf()]);
        let result = tool.invoke(&params("haystack", None)).await;
        assert!(result.is_success());
        assert_eq!(result.output, "No matches found");
    }

    #[tokio::test]
    async fn test_invalid_regex_is_error() {
        let tool = SearchTool::new(vec![PathBuf::from(".")]);
        let result = tool.invoke(&params("(unclosed", None)).await;
        assert!(!result.is_success());
        assert!(result.error_message().starts_with("Invalid regex:"));
    }
}
