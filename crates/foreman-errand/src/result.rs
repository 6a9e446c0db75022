//! Errand invocation results

use serde::{Deserialize, Serialize};
use serde_json::Value;

use foreman_core::{ErrandError, Result};

/// Exit code reserved for an errand that did not run
pub const SKIPPED_EXIT_CODE: i32 = -1;

/// Summary of one errand invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrandResult {
    pub errand_name: String,
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_blobstore_id: Option<String>,
}

impl ErrandResult {
    /// Result of an errand that ran to completion
    pub fn new(errand_name: impl Into<String>, exit_code: i32) -> Self {
        Self {
            errand_name: errand_name.into(),
            exit_code,
            stdout: None,
            stderr: None,
            logs_blobstore_id: None,
        }
    }

    /// Result of an errand skipped because nothing changed
    pub fn skipped(errand_name: impl Into<String>) -> Self {
        Self::new(errand_name, SKIPPED_EXIT_CODE)
    }

    /// Parse the agent's run_errand response:
    /// `{"exit_code": N, "stdout": "...", "stderr": "...", "logs": {"blobstore_id": "..."}}`
    pub fn from_agent_response(errand_name: impl Into<String>, response: &Value) -> Result<Self> {
        let exit_code = response
            .get("exit_code")
            .and_then(Value::as_i64)
            .and_then(|code| i32::try_from(code).ok())
            .ok_or_else(|| ErrandError::InvalidAgentResponse(response.to_string()))?;

        let text = |key: &str| response.get(key).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            errand_name: errand_name.into(),
            exit_code,
            stdout: text("stdout"),
            stderr: text("stderr"),
            logs_blobstore_id: response
                .pointer("/logs/blobstore_id")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    /// Whether the errand was skipped
    pub fn is_skipped(&self) -> bool {
        self.exit_code == SKIPPED_EXIT_CODE
    }

    /// Whether the errand ran and exited cleanly
    pub fn is_successful(&self) -> bool {
        self.exit_code == 0
    }

    /// One line summary used as the task result
    pub fn short_description(&self) -> String {
        let name = &self.errand_name;
        match self.exit_code {
            SKIPPED_EXIT_CODE => format!("Errand '{}' did not run (no configuration changes)", name),
            0 => format!("Errand '{}' completed successfully (exit code 0)", name),
            // Exit codes above 128 mean the errand was terminated by a signal
            code if code > 128 => format!("Errand '{}' was canceled (exit code {})", name, code),
            code => format!("Errand '{}' completed with error (exit code {})", name, code),
        }
    }
}
