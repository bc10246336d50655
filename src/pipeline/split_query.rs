//! SplitQuery (C6): decomposes a multi-aspect analytical question into an
//! ordered sequence of single-table sub-queries.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::{clean, extract_json_array, vars, LlmClient, PromptChain};
use crate::pipeline::state::{HistoryEntry, PipelineState};

const STAGE: &str = "split_query";

const TEMPLATE: &str = "You are decomposing a financial analyst's question into \
single-table sub-queries. Given the question below, emit a JSON array of \
strings, where each element targets exactly one logical analytical table \
(for example fact_revenue, fact_expense, fact_profit). If the question \
already targets a single table, emit a one-element array.\n\n\
Question: {query}\n\n\
Respond with a JSON array of strings and nothing else.";

/// Single-stage subgraph that fills `plan` and resets `current_plan_idx`.
pub struct SplitQuery {
    chain: PromptChain<String>,
    retry_budget: u32,
}

impl SplitQuery {
    pub fn new(llm: Arc<dyn LlmClient>, retry_budget: u32) -> Self {
        Self {
            chain: PromptChain::new(TEMPLATE, llm, |text| Ok(clean(text))),
            retry_budget,
        }
    }

    /// Runs SplitQuery to completion, mutating `state.plan` and
    /// `state.current_plan_idx` only.
    pub async fn invoke(&self, state: &mut PipelineState) -> crate::error::Result<()> {
        let mut attempts_left = self.retry_budget + 1;
        let mut last_error = None;

        while attempts_left > 0 {
            attempts_left -= 1;
            let completion = match self
                .chain
                .invoke_async(&vars(&[("query", &state.query)]))
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            match parse_plan(&completion) {
                Ok(plan) if !plan.is_empty() => {
                    debug!(plan_len = plan.len(), "split_query produced plan");
                    state.plan = plan;
                    state.current_plan_idx = 0;
                    state.push_history(HistoryEntry::ok(STAGE));
                    return Ok(());
                }
                Ok(_) => last_error = Some("split query returned an empty plan".to_string()),
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        warn!(
            error = last_error.as_deref().unwrap_or("unknown"),
            "split_query degraded to single-statement plan"
        );
        state.plan = vec![state.query.clone()];
        state.current_plan_idx = 0;
        state.push_history(HistoryEntry::warning(
            STAGE,
            format!(
                "could not decompose question, falling back to single sub-query: {}",
                last_error.unwrap_or_default()
            ),
        ));
        Ok(())
    }
}

fn parse_plan(completion: &str) -> crate::error::Result<Vec<String>> {
    let json = extract_json_array(completion)?;
    serde_json::from_str(&json)
        .map_err(|e| crate::error::EngineError::parse(format!("invalid plan JSON: {e}")))
}
