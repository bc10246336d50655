//! Report Generator (C11): turns the fetched tabular summary into a
//! structured natural-language analysis.

use std::sync::Arc;

use tracing::warn;

use crate::llm::{clean, vars, LlmClient, PromptChain};
use crate::pipeline::state::{HistoryEntry, PipelineState};

const STAGE: &str = "report";

const TEMPLATE: &str = "You are a financial analyst. Given the original question and \
the tabular summary of data gathered to answer it, produce a structured report \
with the following sections: Overview, Key Indicators, Trends, Risks, Recommendations.\n\n\
Question: {query}\n\n\
Data:\n{md}\n\n\
Write the report now.";

/// Bound to an LLM configured for long output (see `LlmConfig::for_long_output`).
pub struct ReportGenerator {
    chain: PromptChain<String>,
}

impl ReportGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            chain: PromptChain::new(TEMPLATE, llm, |text| Ok(clean(text))),
        }
    }

    /// On success, sets `state.report`. On LLM failure, leaves `report`
    /// unset and records the error in `history`; the orchestrator still
    /// returns the intermediate state.
    pub async fn invoke(&self, state: &mut PipelineState) -> crate::error::Result<()> {
        let md = if state.md.is_empty() {
            "_no data gathered_".to_string()
        } else {
            state.md.clone()
        };

        match self
            .chain
            .invoke_async(&vars(&[("query", &state.query), ("md", &md)]))
            .await
        {
            Ok(report) => {
                state.report = Some(report);
                state.push_history(HistoryEntry::ok(STAGE));
            }
            Err(e) => {
                warn!(error = %e, "report generation failed");
                state.push_history(HistoryEntry::error(STAGE, e.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::pipeline::state::Outcome;

    #[tokio::test]
    async fn test_report_populated_on_success() {
        let llm = MockLlmClient::new().with_response("top 5", "## Overview\nStrong quarter.");
        let stage = ReportGenerator::new(Arc::new(llm));
        let mut state = PipelineState::new("top 5 revenue accounts");
        state.md = "| account | amt |\n| --- |\n| ops | 100 |\n".to_string();

        stage.invoke(&mut state).await.unwrap();

        assert!(state.report.as_deref().unwrap().contains("Overview"));
        assert_eq!(state.history[0].outcome, Outcome::Ok);
    }

    #[tokio::test]
    async fn test_report_unset_on_llm_failure() {
        struct FailingLlm;
        #[async_trait::async_trait]
        impl LlmClient for FailingLlm {
            async fn invoke(&self, _: &str) -> crate::error::Result<String> {
                Err(crate::error::EngineError::llm("connection refused"))
            }
            async fn invoke_async(&self, prompt: &str) -> crate::error::Result<String> {
                self.invoke(prompt).await
            }
            async fn stream(
                &self,
                _: &str,
            ) -> crate::error::Result<futures::stream::BoxStream<'static, crate::error::Result<String>>>
            {
                Err(crate::error::EngineError::llm("connection refused"))
            }
            async fn list_models(&self) -> crate::error::Result<Vec<String>> {
                Ok(vec![])
            }
            async fn validate_connection(&self) -> bool {
                false
            }
            fn update_config(&mut self, _: crate::llm::LlmConfigUpdate) {}
            fn config(&self) -> &crate::config::LlmConfig {
                unimplemented!()
            }
        }

        let stage = ReportGenerator::new(Arc::new(FailingLlm));
        let mut state = PipelineState::new("q");
        state.md = "some data".to_string();

        stage.invoke(&mut state).await.unwrap();

        assert!(state.report.is_none());
        assert_eq!(state.history[0].outcome, Outcome::Error);
    }
}
