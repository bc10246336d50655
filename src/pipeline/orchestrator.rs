//! Pipeline Orchestrator (C9): drives `SplitQuery -> loop(GenerateSQL;
//! FetchData) -> ReportGen` in either a single-shot Invoke mode or a
//! lazy, cancellable Stream mode.

use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::pipeline::fetch_data::{self, FetchData};
use crate::pipeline::generate_sql::GenerateSql;
use crate::pipeline::report::ReportGenerator;
use crate::pipeline::split_query::SplitQuery;
use crate::pipeline::state::{HistoryEntry, Outcome, PipelineState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Split,
    ParallelPlan,
    PlanStep,
    Report,
    Done,
}

/// Owns the compiled subgraphs for one pipeline configuration and drives
/// invocations against them. Cheap to share: wrap in `Arc` for streaming.
pub struct Orchestrator {
    split_query: SplitQuery,
    generate_sql: GenerateSql,
    fetch_data: FetchData,
    report: ReportGenerator,
    parallel_plan_steps: bool,
}

impl Orchestrator {
    pub fn new(
        split_query: SplitQuery,
        generate_sql: GenerateSql,
        fetch_data: FetchData,
        report: ReportGenerator,
        parallel_plan_steps: bool,
    ) -> Self {
        Self {
            split_query,
            generate_sql,
            fetch_data,
            report,
            parallel_plan_steps,
        }
    }

    /// Runs the pipeline to completion, returning the terminal state.
    pub async fn invoke(&self, query: impl Into<String>, cancel: CancellationToken) -> PipelineState {
        let mut state = PipelineState::new(query);
        let mut phase = Phase::Split;
        while phase != Phase::Done {
            phase = self.step(&mut state, phase, &cancel).await;
        }
        state
    }

    /// Yields a finite lazy sequence of read-only state snapshots, one per
    /// completed stage. Dropping the stream after any snapshot stops the
    /// pipeline before its next suspension point.
    pub fn stream(
        self: Arc<Self>,
        query: impl Into<String>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, PipelineState> {
        let initial = (self, PipelineState::new(query), Phase::Split, cancel);
        stream::unfold(initial, |(orchestrator, mut state, phase, cancel)| async move {
            if phase == Phase::Done {
                return None;
            }
            let next_phase = orchestrator.step(&mut state, phase, &cancel).await;
            let snapshot = state.clone();
            Some((snapshot, (orchestrator, state, next_phase, cancel)))
        })
        .boxed()
    }

    async fn step(&self, state: &mut PipelineState, phase: Phase, cancel: &CancellationToken) -> Phase {
        if cancel.is_cancelled() {
            let already_cancelled = matches!(
                state.history.last().map(|h| h.outcome),
                Some(Outcome::Cancelled)
            );
            if !already_cancelled {
                state.push_history(HistoryEntry::cancelled("orchestrator"));
            }
            return Phase::Done;
        }

        match phase {
            Phase::Split => {
                // SplitQuery degrades gracefully on its own; it never
                // returns a fatal error.
                let _ = self.split_query.invoke(state).await;
                if state.plan.is_empty() {
                    Phase::Report
                } else if self.parallel_plan_steps {
                    Phase::ParallelPlan
                } else {
                    Phase::PlanStep
                }
            }
            Phase::ParallelPlan => {
                self.run_parallel(state).await;
                Phase::Report
            }
            Phase::PlanStep => self.run_one_plan_step(state).await,
            Phase::Report => {
                let _ = self.report.invoke(state).await;
                Phase::Done
            }
            Phase::Done => Phase::Done,
        }
    }

    async fn run_one_plan_step(&self, state: &mut PipelineState) -> Phase {
        if state.current_plan_idx >= state.plan.len() {
            return Phase::Report;
        }

        let sql_len_before = state.sql.len();
        if let Err(e) = self.generate_sql.invoke(state).await {
            state.push_history(HistoryEntry::error("generate_sql", e.to_string()));
            return Phase::Report;
        }

        if state.sql.len() == sql_len_before {
            // Retry budget exhausted for this sub-query: `sql_error` is
            // set and a `budget_exhausted` entry already recorded. Abort
            // the remaining plan rather than misaligning `sql`/`raw_data`
            // indices against `current_plan_idx`.
            return Phase::Report;
        }

        if let Err(e) = self.fetch_data.invoke(state).await {
            state.push_history(HistoryEntry::error("fetch_data", e.to_string()));
            return Phase::Report;
        }

        state.current_plan_idx += 1;
        if state.current_plan_idx >= state.plan.len() {
            Phase::Report
        } else {
            Phase::PlanStep
        }
    }

    /// Fan-out variant of the plan loop: dispatches GenerateSQL+FetchData
    /// for every remaining plan item concurrently, then merges results back
    /// in plan order, stopping at the first failed item.
    async fn run_parallel(&self, state: &mut PipelineState) {
        let start_idx = state.current_plan_idx;
        let pending_indices: Vec<usize> = (start_idx..state.plan.len()).collect();

        let tasks = pending_indices.iter().map(|&idx| {
            let mut sub_state = state.clone();
            sub_state.current_plan_idx = idx;
            sub_state.sql.clear();
            sub_state.raw_data.clear();
            sub_state.history.clear();
            async move {
                if let Err(e) = self.generate_sql.invoke(&mut sub_state).await {
                    sub_state.push_history(HistoryEntry::error("generate_sql", e.to_string()));
                    return (idx, sub_state);
                }
                if !sub_state.sql.is_empty() {
                    if let Err(e) = self.fetch_data.invoke(&mut sub_state).await {
                        sub_state.push_history(HistoryEntry::error("fetch_data", e.to_string()));
                    }
                }
                (idx, sub_state)
            }
        });

        let mut results = join_all(tasks).await;
        results.sort_by_key(|(idx, _)| *idx);

        for (idx, sub_state) in results {
            state.history.extend(sub_state.history);
            if sub_state.sql.is_empty() {
                // This plan item never produced an accepted statement;
                // stop merging so `sql`/`raw_data`/`current_plan_idx`
                // stay aligned (same abort policy as the sequential path).
                break;
            }
            state.sql.extend(sub_state.sql);
            state
                .raw_data
                .extend(sub_state.raw_data.into_iter().map(|mut block| {
                    block.sql_index = idx;
                    block
                }));
            state.current_plan_idx = idx + 1;
        }

        state.md = fetch_data::render_markdown(&state.raw_data, fetch_data::DEFAULT_MAX_CELL_CHARS);
    }
}
