//! Request/response/error types for the completion client.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single-shot completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Maximum agent turns; branch naming always uses 1.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Directory the CLI runs in, so it can resume that session's context.
    pub working_directory: PathBuf,
    /// Resume the most recent session in `working_directory` when true.
    #[serde(default)]
    pub resume: bool,
}

fn default_max_turns() -> u32 {
    1
}

/// A completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub response: String,
}

/// Errors from the completion client.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("failed to spawn completion process: {0}")]
    SpawnFailed(String),

    #[error("completion CLI returned an error: {0}")]
    CliError(String),

    #[error("failed to parse completion output: {0}")]
    ParseFailed(String),

    #[error("completion returned an empty response")]
    EmptyResponse,
}
