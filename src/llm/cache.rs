//! Process-wide LLM client instance cache, keyed by an optional identity.
//!
//! A cached entry is returned for the same key regardless of subsequent
//! config changes elsewhere; omitting the key always builds a fresh
//! instance. Mutations are guarded by a single mutex; the map is small and
//! short-lived entries are uncommon enough that lock-free reads are not
//! worth the complexity here.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::LlmConfig;
use crate::error::Result;
use crate::llm::client::LlmClient;
use crate::llm::ollama::OllamaClient;

static CACHE: Lazy<Mutex<HashMap<String, Arc<dyn LlmClient>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Returns the cached client for `key`, constructing and inserting one via
/// `build` if absent. Pass `None` to always build a fresh, uncached
/// instance.
pub fn get_or_create(
    key: Option<&str>,
    build: impl FnOnce() -> Result<Arc<dyn LlmClient>>,
) -> Result<Arc<dyn LlmClient>> {
    let Some(key) = key else {
        return build();
    };

    let mut cache = CACHE.lock().unwrap();
    if let Some(existing) = cache.get(key) {
        return Ok(Arc::clone(existing));
    }
    let client = build()?;
    cache.insert(key.to_string(), Arc::clone(&client));
    Ok(client)
}

/// Convenience wrapper that caches a standard Ollama client by `key`.
pub fn get_or_create_ollama(key: Option<&str>, config: LlmConfig) -> Result<Arc<dyn LlmClient>> {
    get_or_create(key, || {
        let client: Arc<dyn LlmClient> = Arc::new(OllamaClient::new(config)?);
        Ok(client)
    })
}

/// Removes every cached entry, releasing the underlying clients.
pub fn clear() {
    CACHE.lock().unwrap().clear();
}
