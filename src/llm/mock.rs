//! Deterministic mock LLM client for tests.
//!
//! Returns canned responses keyed by substring match against the prompt,
//! with an optional per-call sequence so a test can script a repair loop
//! (e.g. an invalid SQL candidate followed by a valid one).

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::LlmConfig;
use crate::error::Result;
use crate::llm::client::LlmClient;
use crate::llm::types::LlmConfigUpdate;

/// Mock LLM client that returns canned responses based on input patterns,
/// or a scripted sequence of responses consumed in order.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    config: LlmConfig,
    custom_responses: Vec<(String, String)>,
    /// Scripted sequence consumed in call order, overriding pattern matching.
    sequence: Mutex<Vec<String>>,
    call_count: AtomicUsize,
}

impl Clone for MockLlmClient {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            custom_responses: self.custom_responses.clone(),
            sequence: Mutex::new(self.sequence.lock().unwrap().clone()),
            call_count: AtomicUsize::new(self.call_count.load(Ordering::Relaxed)),
        }
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            config: LlmConfig::default(),
            ..Default::default()
        }
    }

    /// Adds a pattern → response mapping. When the prompt contains
    /// `pattern` (case-insensitive), `response` is returned.
    pub fn with_response(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.custom_responses.push((pattern.into(), response.into()));
        self
    }

    /// Scripts a fixed sequence of responses, one per call, in order. Once
    /// exhausted, falls back to pattern matching.
    pub fn with_sequence(self, responses: Vec<impl Into<String>>) -> Self {
        *self.sequence.lock().unwrap() = responses.into_iter().map(Into::into).collect();
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    fn mock_response(&self, prompt: &str) -> String {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        {
            let mut seq = self.sequence.lock().unwrap();
            if !seq.is_empty() {
                return seq.remove(0);
            }
        }

        let lower = prompt.to_lowercase();
        for (pattern, response) in &self.custom_responses {
            if lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        "I don't understand that request.".to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        Ok(self.mock_response(prompt))
    }

    async fn invoke_async(&self, prompt: &str) -> Result<String> {
        self.invoke(prompt).await
    }

    async fn stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let response = self.mock_response(prompt);
        let chunks: Vec<String> = response
            .chars()
            .collect::<Vec<_>>()
            .chunks(8)
            .map(|c| c.iter().collect())
            .collect();
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec![self.config.model_name.clone()])
    }

    async fn validate_connection(&self) -> bool {
        true
    }

    fn update_config(&mut self, partial: LlmConfigUpdate) {
        if let Some(v) = partial.model_name {
            self.config.model_name = v;
        }
        if let Some(v) = partial.temperature {
            self.config.temperature = v;
        }
    }

    fn config(&self) -> &LlmConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pattern_response() {
        let client = MockLlmClient::new().with_response("revenue", r#"{"sql":"SELECT 1"}"#);
        let response = client.invoke("top 5 revenue accounts").await.unwrap();
        assert!(response.contains("SELECT 1"));
    }

    #[tokio::test]
    async fn test_sequence_consumed_in_order() {
        let client = MockLlmClient::new().with_sequence(vec!["SELEKT bad", "SELECT id FROM t"]);
        assert_eq!(client.invoke("anything").await.unwrap(), "SELEKT bad");
        assert_eq!(client.invoke("anything").await.unwrap(), "SELECT id FROM t");
    }

    #[tokio::test]
    async fn test_sequence_falls_back_to_pattern() {
        let client = MockLlmClient::new()
            .with_sequence(vec!["only one"])
            .with_response("fallback", "matched");
        assert_eq!(client.invoke("x").await.unwrap(), "only one");
        assert_eq!(client.invoke("fallback case").await.unwrap(), "matched");
    }

    #[tokio::test]
    async fn test_unknown_prompt_default_response() {
        let client = MockLlmClient::new();
        let response = client.invoke("nonsense").await.unwrap();
        assert!(response.contains("don't understand"));
    }

    #[tokio::test]
    async fn test_stream_reassembles_to_full_response() {
        let client = MockLlmClient::new().with_response("hi", "hello there");
        let mut stream = client.stream("hi").await.unwrap();
        let mut full = String::new();
        while let Some(chunk) = stream.next().await {
            full.push_str(&chunk.unwrap());
        }
        assert_eq!(full, "hello there");
    }

    #[tokio::test]
    async fn test_call_count_increments() {
        let client = MockLlmClient::new();
        client.invoke("a").await.unwrap();
        client.invoke("b").await.unwrap();
        assert_eq!(client.call_count(), 2);
    }
}
