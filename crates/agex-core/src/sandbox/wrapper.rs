//! Execution-unit rendering and structured-output parsing.

use serde::Deserialize;

use super::config::{Interpreter, WrapMode};

pub const TRUNCATION_MARKER: &str = "\n[OUTPUT TRUNCATED]";

/// Harness around a Python fragment. The fragment is embedded as a JSON
/// string literal, which Python accepts verbatim.
const PYTHON_HARNESS: &str = r#"import io
import json
import sys
import traceback

_agex_source = __AGEX_SOURCE__
_agex_out = io.StringIO()
_agex_err = io.StringIO()
_agex_error = None
sys.stdout, sys.stderr = _agex_out, _agex_err
try:
    exec(compile(_agex_source, "<sandbox>", "exec"), {"__name__": "__main__"})
except SystemExit as _agex_exit:
    if _agex_exit.code not in (None, 0):
        _agex_error = "SystemExit: %s" % (_agex_exit.code,)
except BaseException:
    _agex_error = traceback.format_exc()
finally:
    sys.stdout, sys.stderr = sys.__stdout__, sys.__stderr__

print(json.dumps({"stdout": _agex_out.getvalue(), "stderr": _agex_err.getvalue(), "error": _agex_error}))
sys.exit(1 if _agex_error else 0)
"#;

/// Wire payload printed by the harness.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StructuredOutput {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// File contents handed to the interpreter for `code`.
pub fn render(interpreter: &Interpreter, code: &str) -> String {
    match interpreter.wrap {
        WrapMode::Raw => code.to_string(),
        WrapMode::PythonJson => {
            // serde_json never fails on a &str.
            let literal = serde_json::to_string(code).unwrap_or_else(|_| "\"\"".to_string());
            PYTHON_HARNESS.replace("__AGEX_SOURCE__", &literal)
        }
    }
}

/// Parse the harness payload from the last non-empty stdout line.
pub fn parse_structured(stdout: &str) -> Option<StructuredOutput> {
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    serde_json::from_str(line.trim()).ok()
}

/// Cap `text` at `max_bytes` on a char boundary, appending the marker when cut.
pub fn truncate(text: String, max_bytes: usize) -> (String, bool) {
    if text.len() <= max_bytes {
        return (text, false);
    }
    let mut cut = max_bytes;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = text;
    out.truncate(cut);
    out.push_str(TRUNCATION_MARKER);
    (out, true)
}
