//! LLM integration for the analyst engine.
//!
//! Provides the uniform client contract (`LlmClient`), two output parsers,
//! a prompt/chain composer, and a process-wide instance cache.

pub mod cache;
pub mod client;
pub mod mock;
pub mod ollama;
pub mod parser;
pub mod prompt;
pub mod types;

pub use client::LlmClient;
pub use mock::MockLlmClient;
pub use ollama::OllamaClient;
pub use parser::{clean, extract_json, extract_json_array};
pub use prompt::{vars, PromptChain};
pub use types::{LlmConfigUpdate, LlmResponse};
