//! Subgraph Registry (C10): a process-wide `name -> Subgraph Descriptor`
//! mapping, mirroring the LLM client cache's mutex-guarded `Lazy` map.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::error::{EngineError, Result};
use crate::pipeline::fetch_data::FetchData;
use crate::pipeline::generate_sql::GenerateSql;
use crate::pipeline::split_query::SplitQuery;
use crate::pipeline::state::PipelineState;

/// The closed variant set of subgraph kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubgraphKind {
    SplitQuery,
    GenerateSql,
    FetchData,
    Custom,
}

impl fmt::Display for SubgraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SplitQuery => write!(f, "split_query"),
            Self::GenerateSql => write!(f, "generate_sql"),
            Self::FetchData => write!(f, "fetch_data"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// Uniform `invoke(state) -> state` contract every registry entry exposes,
/// regardless of kind. Mutates the state it's given and returns it.
#[async_trait]
pub trait Subgraph: Send + Sync {
    async fn invoke(&self, state: &mut PipelineState) -> Result<()>;
}

#[async_trait]
impl Subgraph for SplitQuery {
    async fn invoke(&self, state: &mut PipelineState) -> Result<()> {
        SplitQuery::invoke(self, state).await
    }
}

#[async_trait]
impl Subgraph for GenerateSql {
    async fn invoke(&self, state: &mut PipelineState) -> Result<()> {
        GenerateSql::invoke(self, state).await
    }
}

#[async_trait]
impl Subgraph for FetchData {
    async fn invoke(&self, state: &mut PipelineState) -> Result<()> {
        FetchData::invoke(self, state).await
    }
}

/// `{name, kind, compiled_handle, config}`. `config` is a free-form JSON
/// value so each kind can carry whatever construction parameters it needs
/// without the registry knowing their shape.
#[derive(Clone)]
pub struct Descriptor {
    pub name: String,
    pub kind: SubgraphKind,
    pub config: serde_json::Value,
    compiled: Arc<dyn Subgraph>,
}

impl Descriptor {
    pub fn new(
        name: impl Into<String>,
        kind: SubgraphKind,
        config: serde_json::Value,
        compiled: Arc<dyn Subgraph>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            config,
            compiled,
        }
    }
}

static REGISTRY: Lazy<Mutex<HashMap<String, Descriptor>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Registers `descriptor` under its own name, replacing (and releasing)
/// any existing entry with the same name.
pub fn register(descriptor: Descriptor) -> Descriptor {
    let mut registry = REGISTRY.lock().unwrap();
    registry.insert(descriptor.name.clone(), descriptor.clone());
    descriptor
}

/// Alias for `register`, used when the caller is deliberately overwriting
/// an existing entry (e.g. hot-swapping a tuned configuration).
pub fn replace(descriptor: Descriptor) -> Descriptor {
    register(descriptor)
}

pub fn get(name: &str) -> Option<Descriptor> {
    REGISTRY.lock().unwrap().get(name).cloned()
}

pub fn remove(name: &str) -> bool {
    REGISTRY.lock().unwrap().remove(name).is_some()
}

pub fn list() -> Vec<String> {
    REGISTRY.lock().unwrap().keys().cloned().collect()
}

pub fn clear() {
    REGISTRY.lock().unwrap().clear();
}

/// Forwards to the named entry's compiled handle regardless of kind.
pub async fn invoke(name: &str, mut state: PipelineState) -> Result<PipelineState> {
    let descriptor = get(name)
        .ok_or_else(|| EngineError::internal(format!("no subgraph registered under '{name}'")))?;
    descriptor.compiled.invoke(&mut state).await?;
    Ok(state)
}
