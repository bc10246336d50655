//! The Pipeline State record threaded through every stage of one invocation,
//! plus its append-only audit log.

use crate::db::ResultBlock;
use serde::{Deserialize, Serialize};

/// Outcome of a single stage's execution, recorded in `history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Ok,
    Warning,
    Error,
    Cancelled,
}

/// One append-only audit log record. Mirrors the host's
/// `QueryLogEntry::success_with_source`/`error_with_source` builder style.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub stage: &'static str,
    pub timestamp: String,
    pub outcome: Outcome,
    pub message: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

impl HistoryEntry {
    fn new(stage: &'static str, outcome: Outcome, message: Option<String>) -> Self {
        Self {
            stage,
            timestamp: chrono::Utc::now().to_rfc3339(),
            outcome,
            message,
            prompt_tokens: None,
            completion_tokens: None,
        }
    }

    pub fn ok(stage: &'static str) -> Self {
        Self::new(stage, Outcome::Ok, None)
    }

    pub fn warning(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, Outcome::Warning, Some(message.into()))
    }

    pub fn error(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, Outcome::Error, Some(message.into()))
    }

    pub fn cancelled(stage: &'static str) -> Self {
        Self::new(stage, Outcome::Cancelled, None)
    }

    /// Attaches token-usage figures from the LLM response that produced
    /// this entry.
    pub fn with_tokens(mut self, prompt_tokens: Option<u32>, completion_tokens: Option<u32>) -> Self {
        self.prompt_tokens = prompt_tokens;
        self.completion_tokens = completion_tokens;
        self
    }
}

/// The single mutable record passed between stages of one pipeline
/// invocation. Subgraphs receive a borrowed reference and, by contract,
/// mutate only the fields their stage owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub query: String,
    pub plan: Vec<String>,
    pub current_plan_idx: usize,
    pub sql: Vec<String>,
    pub sql_error: Option<String>,
    pub db_struc: Option<String>,
    pub raw_data: Vec<ResultBlock>,
    pub md: String,
    pub history: Vec<HistoryEntry>,
    pub report: Option<String>,
    pub retries_remaining: u32,
}

impl PipelineState {
    /// Starts a fresh invocation for `query`. All other fields are empty;
    /// `plan` is populated by SplitQuery and `current_plan_idx` advances
    /// monotonically from there.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            plan: Vec::new(),
            current_plan_idx: 0,
            sql: Vec::new(),
            sql_error: None,
            db_struc: None,
            raw_data: Vec::new(),
            md: String::new(),
            history: Vec::new(),
            report: None,
            retries_remaining: 0,
        }
    }

    /// `success = report != ∅ ∧ no fatal history entry`. Matches the
    /// response-level `success: bool` every invocation exposes.
    pub fn is_success(&self) -> bool {
        self.report.is_some() && !self.history.iter().any(|h| h.outcome == Outcome::Error)
    }

    /// True once every planned sub-query has an accepted statement and a
    /// matching result block (invariant 1 of the testable properties).
    pub fn is_complete(&self) -> bool {
        !self.plan.is_empty()
            && self.sql.len() == self.plan.len()
            && self.raw_data.len() == self.plan.len()
            && self.current_plan_idx == self.plan.len()
    }

    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }
}
