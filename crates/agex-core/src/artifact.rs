//! Persisted execution results with digest verification.
//!
//! Layout: `<dir>/<run_id>/result.json` plus `<dir>/<run_id>/result.digest`
//! holding the hex SHA-256 of the JSON bytes.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::domain::error::{AgexError, Result};
use crate::domain::result::ExecutionResult;

const RESULT_FILE: &str = "result.json";
const DIGEST_FILE: &str = "result.digest";

/// Hex SHA-256 of `bytes`.
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Write `result` under `<dir>/<run_id>/` and return the JSON path.
pub fn write_result_artifact(result: &ExecutionResult, dir: &Path) -> Result<PathBuf> {
    let run_dir = run_dir(dir, &result.run_id)?;
    std::fs::create_dir_all(&run_dir)?;

    let artifact_path = run_dir.join(RESULT_FILE);
    let json = serde_json::to_vec_pretty(result)?;
    std::fs::write(&artifact_path, &json)?;
    std::fs::write(run_dir.join(DIGEST_FILE), digest_hex(&json).as_bytes())?;

    Ok(artifact_path)
}

/// Read and verify `<dir>/<run_id>/result.json`.
pub fn read_result_artifact(run_id: &str, dir: &Path) -> Result<ExecutionResult> {
    let run_dir = run_dir(dir, run_id)?;
    let json = std::fs::read(run_dir.join(RESULT_FILE))?;
    let expected = std::fs::read_to_string(run_dir.join(DIGEST_FILE))?;
    let actual = digest_hex(&json);
    if expected.trim() != actual {
        return Err(AgexError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

fn run_dir(dir: &Path, run_id: &str) -> Result<PathBuf> {
    let valid = !run_id.is_empty()
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(AgexError::InvalidRunId(run_id.to_string()));
    }
    Ok(dir.join(run_id))
}
