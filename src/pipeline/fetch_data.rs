//! FetchData (C8): executes the current plan step's SQL, appends its result
//! block, and re-renders the Markdown summary of everything fetched so far.

use std::sync::Arc;

use tracing::warn;

use crate::db::{DatabaseClient, ResultBlock, Value};
use crate::error::Result;
use crate::pipeline::state::{HistoryEntry, PipelineState};

const STAGE: &str = "fetch_data";
pub(crate) const DEFAULT_MAX_CELL_CHARS: usize = 200;

/// Executes newly-accepted statements and appends their results to
/// `state.raw_data`, re-rendering `state.md` from the full accumulated set.
pub struct FetchData {
    db: Arc<dyn DatabaseClient>,
    max_cell_chars: usize,
}

impl FetchData {
    pub fn new(db: Arc<dyn DatabaseClient>) -> Self {
        Self {
            db,
            max_cell_chars: DEFAULT_MAX_CELL_CHARS,
        }
    }

    pub fn with_max_cell_chars(mut self, max_cell_chars: usize) -> Self {
        self.max_cell_chars = max_cell_chars;
        self
    }

    /// Executes every statement in `state.sql` not yet reflected in
    /// `state.raw_data` (invariant 1: `raw_data[i].sql_index == i`), then
    /// rebuilds `state.md` from the full `raw_data`.
    pub async fn invoke(&self, state: &mut PipelineState) -> Result<()> {
        let start = state.raw_data.len();
        if start >= state.sql.len() {
            return Ok(());
        }

        let pending: Vec<String> = state.sql[start..].to_vec();
        let blocks = self.db.execute_read(&pending).await?;

        for (offset, mut block) in blocks.into_iter().enumerate() {
            let absolute_index = start + offset;
            block.sql_index = absolute_index;
            normalize_rows(&mut block.rows);
            if let Some(error) = &block.error {
                warn!(sql_index = absolute_index, error = %error, "statement failed");
                state.push_history(HistoryEntry::warning(
                    STAGE,
                    format!("statement {absolute_index} failed: {error}"),
                ));
            } else {
                state.push_history(HistoryEntry::ok(STAGE));
            }
            state.raw_data.push(block);
        }

        state.md = render_markdown(&state.raw_data, self.max_cell_chars);
        Ok(())
    }
}

/// Coerces every value in `rows` into a JSON-serialisable form, in place:
/// binary columns become base64 strings via `Value::to_json_safe`. Other
/// variants already serialise safely and pass through unchanged.
fn normalize_rows(rows: &mut [Vec<Value>]) {
    for row in rows.iter_mut() {
        for value in row.iter_mut() {
            if let Value::Bytes(_) = value {
                if let serde_json::Value::String(encoded) = value.to_json_safe() {
                    *value = Value::String(encoded);
                }
            }
        }
    }
}

pub(crate) fn render_markdown(raw_data: &[ResultBlock], max_cell_chars: usize) -> String {
    let mut out = String::new();
    for block in raw_data {
        out.push_str(&format!("## Statement {}\n\n", block.sql_index));

        if let Some(error) = &block.error {
            out.push_str(&format!("_Error: {error}_\n\n"));
            continue;
        }

        if block.rows.is_empty() {
            out.push_str("_no rows_\n\n");
            continue;
        }

        let header = block
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        out.push_str(&format!("| {header} |\n"));
        out.push_str(&format!(
            "|{}\n",
            " --- |".repeat(block.columns.len().max(1))
        ));

        for row in &block.rows {
            let cells = row
                .iter()
                .map(|v| truncate(&v.to_display_string(), max_cell_chars))
                .collect::<Vec<_>>()
                .join(" | ");
            out.push_str(&format!("| {cells} |\n"));
        }
        out.push('\n');
    }
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}
