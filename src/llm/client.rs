//! The uniform LLM client contract used by every stage.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::LlmConfig;
use crate::error::Result;
use crate::llm::types::LlmConfigUpdate;

/// A text-completion backend. Implementations must be thread-safe: the
/// process-wide cache (`llm::cache`) hands out shared `Arc<dyn LlmClient>`
/// references across concurrent pipeline invocations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Blocking-style completion. On the async runtimes this crate targets
    /// there is no separate blocking path; `invoke` and `invoke_async` both
    /// drive the same underlying request to completion.
    async fn invoke(&self, prompt: &str) -> Result<String>;

    /// Async completion, identical in contract to `invoke`.
    async fn invoke_async(&self, prompt: &str) -> Result<String>;

    /// Streams the completion as a finite, lazy sequence of text chunks.
    /// Consumers may drop the stream at any point; implementations must
    /// release the underlying connection on drop.
    async fn stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>>;

    /// Lists model names known to the backend.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Checks that the backend is reachable and responding.
    async fn validate_connection(&self) -> bool;

    /// Applies a partial configuration update in place.
    fn update_config(&mut self, partial: LlmConfigUpdate);

    /// Returns the client's current configuration.
    fn config(&self) -> &LlmConfig;
}
