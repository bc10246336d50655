//! Request/response types for LLM communication.

use serde::{Deserialize, Serialize};

/// A single completion exchanged with an LLM backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Identifier correlating this response to its request, for logging.
    pub request_id: String,
    pub model_name: String,
    pub prompt: String,
    /// The raw completion text. Empty when `error` is set.
    pub response: String,
    pub error: Option<String>,
    pub duration_s: f64,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl LlmResponse {
    pub fn success(
        request_id: impl Into<String>,
        model_name: impl Into<String>,
        prompt: impl Into<String>,
        response: impl Into<String>,
        duration_s: f64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    ) -> Self {
        let total_tokens = match (prompt_tokens, completion_tokens) {
            (Some(p), Some(c)) => Some(p + c),
            _ => None,
        };
        Self {
            request_id: request_id.into(),
            model_name: model_name.into(),
            prompt: prompt.into(),
            response: response.into(),
            error: None,
            duration_s,
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A partial update applied to an `LlmConfig` in place; unset fields keep
/// their current value.
#[derive(Debug, Clone, Default)]
pub struct LlmConfigUpdate {
    pub model_name: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub stream: Option<bool>,
    pub timeout_s: Option<u64>,
}
