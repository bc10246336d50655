//! GenerateSQL (C7): synthesises, validates, and (if necessary) repairs a
//! SQL statement for the current plan step.
//!
//! Explicit state machine: `Prepare -> Synthesise -> Validate ->
//! (Accept | Repair) -> Terminal`.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::db::DatabaseClient;
use crate::error::{EngineError, Result};
use crate::llm::{extract_json, vars, LlmClient, PromptChain};
use crate::pipeline::state::{HistoryEntry, PipelineState};
use crate::safety::validate_read_only;

const STAGE: &str = "generate_sql";

const TEMPLATE: &str = "You are a PostgreSQL expert writing a single read-only \
statement to answer a sub-question from a financial analyst.\n\n\
Sub-question: {sub_query}\n\n\
Database structure:\n{db_struc}\n\n\
Prior validation error (empty if this is the first attempt): {prior_error}\n\n\
Respond with a single JSON object: {{\"sql\": \"<statement>\", \"explanation\": \"<optional>\"}}. \
The statement must be a single SELECT (CTEs allowed), with no trailing semicolon-separated statements.";

#[derive(Debug, Deserialize)]
struct SqlCandidate {
    sql: String,
    #[allow(dead_code)]
    explanation: Option<String>,
    #[allow(dead_code)]
    warnings: Option<Vec<String>>,
}

/// State machine for synthesising one sub-query's SQL statement.
pub struct GenerateSql {
    chain: PromptChain<SqlCandidate>,
    db: Arc<dyn DatabaseClient>,
    retry_budget: u32,
}

impl GenerateSql {
    pub fn new(llm: Arc<dyn LlmClient>, db: Arc<dyn DatabaseClient>, retry_budget: u32) -> Self {
        Self {
            chain: PromptChain::new(TEMPLATE, llm, parse_candidate),
            db,
            retry_budget,
        }
    }

    /// Drives the state machine to completion for
    /// `state.plan[state.current_plan_idx]`. On acceptance, appends to
    /// `state.sql` and an `Ok` history entry. On retry-budget exhaustion,
    /// `state.sql` is left untouched, `state.sql_error` holds the last
    /// validator message, and a `budget_exhausted` history entry is
    /// appended.
    pub async fn invoke(&self, state: &mut PipelineState) -> Result<()> {
        let sub_query = state
            .plan
            .get(state.current_plan_idx)
            .ok_or_else(|| EngineError::internal("generate_sql invoked with no current plan step"))?
            .clone();

        // Prepare
        if state.db_struc.is_none() {
            let schema = self.db.introspect_schema().await?;
            state.db_struc = Some(schema.format_for_llm());
        }
        state.retries_remaining = self.retry_budget;
        state.sql_error = None;

        loop {
            let prior_error = state.sql_error.clone().unwrap_or_default();
            let db_struc = state.db_struc.clone().unwrap_or_default();

            let synthesised = self
                .chain
                .invoke_async(&vars(&[
                    ("sub_query", &sub_query),
                    ("db_struc", &db_struc),
                    ("prior_error", &prior_error),
                ]))
                .await;

            let candidate = match synthesised {
                Ok(candidate) => candidate,
                Err(e) => {
                    if !self.repair_or_terminate(state, e.to_string()) {
                        return Ok(());
                    }
                    continue;
                }
            };

            match validate_read_only(&candidate.sql) {
                Ok(()) => {
                    debug!(sub_query = %sub_query, "generate_sql accepted statement");
                    state.sql.push(candidate.sql);
                    state.sql_error = None;
                    state.push_history(HistoryEntry::ok(STAGE));
                    return Ok(());
                }
                Err(e) => {
                    if !self.repair_or_terminate(state, e.to_string()) {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Records `message` as the current `sql_error`. If a retry remains,
    /// decrements `retries_remaining`, pushes a `Warning` history entry,
    /// and returns `true` to continue the loop. Otherwise pushes a
    /// `budget_exhausted` `Error` history entry and returns `false`.
    fn repair_or_terminate(&self, state: &mut PipelineState, message: String) -> bool {
        state.sql_error = Some(message.clone());

        if state.retries_remaining > 0 {
            state.retries_remaining -= 1;
            state.push_history(HistoryEntry::warning(STAGE, message));
            true
        } else {
            state.push_history(HistoryEntry::error(
                STAGE,
                format!("retry budget exhausted: {message}"),
            ));
            false
        }
    }
}

fn parse_candidate(text: &str) -> Result<SqlCandidate> {
    let json = extract_json(text)?;
    serde_json::from_str(&json).map_err(|e| EngineError::parse(format!("invalid SQL candidate JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockDatabaseClient;
    use crate::llm::MockLlmClient;
    use crate::pipeline::state::Outcome;

    fn state_with_plan(plan: &[&str]) -> PipelineState {
        let mut state = PipelineState::new("q");
        state.plan = plan.iter().map(|s| s.to_string()).collect();
        state.current_plan_idx = 0;
        state
    }

    #[tokio::test]
    async fn test_accepts_first_valid_candidate() {
        let llm = MockLlmClient::new()
            .with_response("revenue", r#"{"sql": "SELECT account FROM fact_revenue"}"#);
        let db = MockDatabaseClient::new();
        let stage = GenerateSql::new(Arc::new(llm), Arc::new(db), 3);
        let mut state = state_with_plan(&["top revenue accounts"]);

        stage.invoke(&mut state).await.unwrap();

        assert_eq!(state.sql, vec!["SELECT account FROM fact_revenue"]);
        assert!(state.sql_error.is_none());
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].outcome, Outcome::Ok);
    }

    #[tokio::test]
    async fn test_repairs_after_invalid_sql_then_accepts() {
        let llm = MockLlmClient::new().with_sequence(vec![
            r#"{"sql": "SELEKT id FROM fact_profit"}"#,
            r#"{"sql": "SELECT id FROM fact_profit"}"#,
        ]);
        let db = MockDatabaseClient::new();
        let stage = GenerateSql::new(Arc::new(llm), Arc::new(db), 3);
        let mut state = state_with_plan(&["profit by id"]);

        stage.invoke(&mut state).await.unwrap();

        assert_eq!(state.sql, vec!["SELECT id FROM fact_profit"]);
        assert_eq!(state.retries_remaining, 2);
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[0].outcome, Outcome::Warning);
        assert_eq!(state.history[1].outcome, Outcome::Ok);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_leaves_sql_unset() {
        let llm = MockLlmClient::new().with_sequence(vec![
            r#"{"sql": "DROP TABLE fact_profit"}"#,
            r#"{"sql": "DROP TABLE fact_profit"}"#,
            r#"{"sql": "DROP TABLE fact_profit"}"#,
        ]);
        let db = MockDatabaseClient::new();
        let stage = GenerateSql::new(Arc::new(llm), Arc::new(db), 2);
        let mut state = state_with_plan(&["drop everything"]);

        stage.invoke(&mut state).await.unwrap();

        assert!(state.sql.is_empty());
        assert!(state.sql_error.is_some());
        assert_eq!(state.history.len(), 3);
        assert_eq!(state.history.last().unwrap().outcome, Outcome::Error);
    }

    #[tokio::test]
    async fn test_write_attempt_is_rejected_as_validation_error() {
        let llm = MockLlmClient::new()
            .with_response("drop", r#"{"sql": "DROP TABLE fact_profit;"}"#);
        let db = MockDatabaseClient::new();
        let stage = GenerateSql::new(Arc::new(llm), Arc::new(db), 0);
        let mut state = state_with_plan(&["drop the profit table"]);

        stage.invoke(&mut state).await.unwrap();

        assert!(state.sql.is_empty());
        let message = state.sql_error.as_ref().unwrap();
        assert!(message.contains("not read-only") || message.contains("multiple statements"));
    }
}
