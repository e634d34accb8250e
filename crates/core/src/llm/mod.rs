//! LLM completion client used for branch-name suggestion.

pub mod claude_cli;
pub mod provider;
pub mod types;

pub use claude_cli::ClaudeCliClient;
pub use provider::CompletionClient;
pub use types::{CompletionRequest, CompletionResponse, LlmError};
