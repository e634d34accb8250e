//! The `CompletionClient` trait the supervisor is parameterized over.

use async_trait::async_trait;

use super::types::{CompletionRequest, CompletionResponse, LlmError};

/// A client that can run a single text completion.
///
/// The production implementation is [`super::ClaudeCliClient`]; tests supply
/// scripted implementations. Deadlines are the caller's responsibility
/// (`tokio::time::timeout` around the call).
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn create_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError>;

    /// Client name for logging.
    fn name(&self) -> &str;
}
