//! Completion client backed by the `claude` CLI binary.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::provider::CompletionClient;
use super::types::{CompletionRequest, CompletionResponse, LlmError};

/// Spawns `claude -p --output-format json ...` and parses the JSON reply.
pub struct ClaudeCliClient {
    binary: String,
}

impl ClaudeCliClient {
    pub fn new() -> Self {
        Self {
            binary: "claude".to_string(),
        }
    }

    /// Override the binary path (used by packaging and tests).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for ClaudeCliClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionClient for ClaudeCliClient {
    async fn create_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("-p")
            .args(["--output-format", "json"])
            .args(["--max-turns", &request.max_turns.to_string()])
            .current_dir(&request.working_directory)
            .stdin(std::process::Stdio::null());

        if let Some(system_prompt) = &request.system_prompt {
            command.args(["--system-prompt", system_prompt]);
        }
        if request.resume {
            command.arg("--continue");
        }
        command.arg(&request.prompt);

        debug!(
            binary = %self.binary,
            cwd = %request.working_directory.display(),
            "requesting completion"
        );

        let output = command
            .output()
            .await
            .map_err(|e| LlmError::SpawnFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LlmError::CliError(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let response = parse_cli_output(&stdout)?;
        if response.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        Ok(CompletionResponse { response })
    }

    fn name(&self) -> &str {
        "claude-cli"
    }
}

/// Extract the reply text from the CLI's JSON output.
///
/// The CLI wraps its answer as `{"result": "..."}`; plain-text output is
/// accepted as a fallback for older versions.
fn parse_cli_output(stdout: &str) -> Result<String, LlmError> {
    match serde_json::from_str::<serde_json::Value>(stdout) {
        Ok(value) => value
            .get("result")
            .and_then(|r| r.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LlmError::ParseFailed("missing `result` field".to_string())),
        Err(_) => {
            let raw = stdout.trim();
            if raw.is_empty() {
                Err(LlmError::EmptyResponse)
            } else {
                Ok(raw.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_result_wrapper() {
        let out = r#"{"result": "feature/login-flow", "cost_usd": 0.001}"#;
        assert_eq!(parse_cli_output(out).unwrap(), "feature/login-flow");
    }

    #[test]
    fn falls_back_to_plain_text() {
        assert_eq!(parse_cli_output("feature/login-flow\n").unwrap(), "feature/login-flow");
    }

    #[test]
    fn missing_result_field_is_an_error() {
        let out = r#"{"answer": "nope"}"#;
        assert!(matches!(
            parse_cli_output(out),
            Err(LlmError::ParseFailed(_))
        ));
    }

    #[test]
    fn empty_output_is_an_error() {
        assert!(matches!(parse_cli_output("   "), Err(LlmError::EmptyResponse)));
    }
}
