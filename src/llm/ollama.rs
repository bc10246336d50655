//! Ollama-compatible LLM client implementation.
//!
//! Targets the `/api/generate` completion endpoint (flat `prompt` string,
//! not the chat-message `/api/chat` contract) and `/api/tags` for model
//! listing.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{EngineError, Result};
use crate::llm::client::LlmClient;
use crate::llm::types::{LlmConfigUpdate, LlmResponse};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a process-unique, monotonically increasing request id for
/// correlating an `LlmResponse` back to its originating call in logs.
fn next_request_id() -> String {
    format!("req-{}", REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Ollama-compatible LLM client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: LlmConfig,
    client: Client,
}

impl OllamaClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_s))
            .build()
            .map_err(|e| EngineError::llm(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, prompt: &str, stream: bool) -> serde_json::Value {
        json!({
            "model": self.config.model_name,
            "prompt": prompt,
            "stream": stream,
            "options": {
                "temperature": self.config.temperature,
                "num_predict": self.config.max_tokens,
                "top_p": self.config.top_p,
            },
        })
    }

    fn map_send_error(url: &str, e: reqwest::Error) -> EngineError {
        if e.is_timeout() {
            EngineError::llm(format!("Request to {url} timed out"))
        } else if e.is_connect() {
            EngineError::llm(format!(
                "Failed to connect to LLM backend at {url}. Is it running?"
            ))
        } else {
            EngineError::llm(format!("Request to {url} failed: {e}"))
        }
    }

    async fn generate(&self, prompt: &str) -> Result<GenerateResponse> {
        let url = self.generate_url();
        let response = self
            .client
            .post(&url)
            .json(&self.request_body(prompt, false))
            .send()
            .await
            .map_err(|e| Self::map_send_error(&url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EngineError::llm(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(EngineError::llm(format!(
                "LLM backend returned {status}: {body}"
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| EngineError::llm(format!("Failed to parse LLM response: {e}")))
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        self.invoke_async(prompt).await
    }

    async fn invoke_async(&self, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let generated = self.generate(prompt).await;
        let duration_s = start.elapsed().as_secs_f64();

        match generated {
            Ok(g) => {
                let response = LlmResponse::success(
                    next_request_id(),
                    self.config.model_name.clone(),
                    prompt,
                    g.response.clone(),
                    duration_s,
                    g.prompt_eval_count,
                    g.eval_count,
                );
                debug!(
                    request_id = %response.request_id,
                    duration_s = response.duration_s,
                    prompt_tokens = ?response.prompt_tokens,
                    completion_tokens = ?response.completion_tokens,
                    total_tokens = ?response.total_tokens,
                    "llm call completed"
                );
                Ok(g.response)
            }
            Err(e) => Err(e),
        }
    }

    async fn stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let url = self.generate_url();
        let response = self
            .client
            .post(&url)
            .json(&self.request_body(prompt, true))
            .send()
            .await
            .map_err(|e| Self::map_send_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::llm(format!(
                "LLM backend returned {status}: {body}"
            )));
        }

        let stream = response.bytes_stream();
        let parsed = stream
            .map(|chunk| {
                chunk
                    .map_err(|e| EngineError::llm(format!("Stream error: {e}")))
                    .and_then(|bytes| {
                        let text = String::from_utf8_lossy(&bytes);
                        parse_ndjson_chunk(&text)
                    })
            })
            .filter_map(|result| async move {
                match result {
                    Ok(Some(text)) => Some(Ok(text)),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(parsed.boxed())
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = self.tags_url();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::map_send_error(&url, e))?;

        if !response.status().is_success() {
            return Err(EngineError::llm(format!(
                "Failed to list models: {}",
                response.status()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| EngineError::llm(format!("Failed to parse model list: {e}")))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn validate_connection(&self) -> bool {
        self.client.get(self.tags_url()).send().await.is_ok()
    }

    fn update_config(&mut self, partial: LlmConfigUpdate) {
        if let Some(v) = partial.model_name {
            self.config.model_name = v;
        }
        if let Some(v) = partial.base_url {
            self.config.base_url = v;
        }
        if let Some(v) = partial.temperature {
            self.config.temperature = v;
        }
        if let Some(v) = partial.max_tokens {
            self.config.max_tokens = v;
        }
        if let Some(v) = partial.top_p {
            self.config.top_p = v;
        }
        if let Some(v) = partial.frequency_penalty {
            self.config.frequency_penalty = v;
        }
        if let Some(v) = partial.presence_penalty {
            self.config.presence_penalty = v;
        }
        if let Some(v) = partial.stream {
            self.config.stream = v;
        }
        if let Some(v) = partial.timeout_s {
            self.config.timeout_s = v;
        }
    }

    fn config(&self) -> &LlmConfig {
        &self.config
    }
}

/// Parses one or more newline-delimited JSON objects out of a raw chunk,
/// concatenating each `response` field. Ollama sometimes batches several
/// NDJSON lines per TCP read.
fn parse_ndjson_chunk(chunk: &str) -> Result<Option<String>> {
    let mut text = String::new();
    for line in chunk.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(event) = serde_json::from_str::<GenerateResponse>(line) {
            text.push_str(&event.response);
        }
    }
    Ok(if text.is_empty() { None } else { Some(text) })
}

#[derive(Debug, Serialize, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}
