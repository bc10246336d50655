//! In-memory database client for headless testing.
//!
//! Lets pipeline tests exercise `GenerateSql`/`FetchData` deterministically
//! without a live PostgreSQL instance: canned schema, canned per-statement
//! results keyed by a substring match against the SQL text.

use super::{ColumnInfo, DatabaseClient, ResultBlock, Schema, Value};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Mutex;

/// A mock database client that returns predefined results.
pub struct MockDatabaseClient {
    schema: Schema,
    /// (substring to match against the SQL, canned result block contents)
    canned: Vec<(String, Vec<ColumnInfo>, Vec<Vec<Value>>)>,
    /// Substrings that should cause the matching statement to fail.
    failing: Vec<(String, String)>,
    call_count: Mutex<usize>,
}

impl MockDatabaseClient {
    /// Creates a new mock database client with an empty schema and no canned
    /// results; every statement resolves to a single-row/single-column
    /// placeholder result.
    pub fn new() -> Self {
        Self {
            schema: Schema::default(),
            canned: Vec::new(),
            failing: Vec::new(),
            call_count: Mutex::new(0),
        }
    }

    /// Creates a new mock database client with the given schema.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            ..Self::new()
        }
    }

    /// Registers a canned result for any statement containing `pattern`
    /// (case-insensitive). The first matching pattern wins.
    pub fn with_result(
        mut self,
        pattern: impl Into<String>,
        columns: Vec<ColumnInfo>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.canned.push((pattern.into(), columns, rows));
        self
    }

    /// Registers a substring that causes matching statements to fail with
    /// the given error message, e.g. to exercise partial-batch failure
    /// handling in `FetchData`.
    pub fn with_failure(mut self, pattern: impl Into<String>, error: impl Into<String>) -> Self {
        self.failing.push((pattern.into(), error.into()));
        self
    }

    /// Number of statements executed so far across all `execute_read` calls.
    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn introspect_schema(&self) -> Result<Schema> {
        Ok(self.schema.clone())
    }

    async fn execute_read(&self, statements: &[String]) -> Result<Vec<ResultBlock>> {
        *self.call_count.lock().unwrap() += statements.len();

        let blocks = statements
            .iter()
            .enumerate()
            .map(|(index, sql)| {
                let sql_lower = sql.to_lowercase();

                if let Some((_, error)) = self
                    .failing
                    .iter()
                    .find(|(pattern, _)| sql_lower.contains(&pattern.to_lowercase()))
                {
                    return ResultBlock::failed(index, sql.clone(), error.clone());
                }

                if let Some((_, columns, rows)) = self
                    .canned
                    .iter()
                    .find(|(pattern, _, _)| sql_lower.contains(&pattern.to_lowercase()))
                {
                    return ResultBlock::ok(index, sql.clone(), columns.clone(), rows.clone());
                }

                if sql_lower.trim_start().starts_with("select") {
                    let columns = vec![ColumnInfo::new("result", "text")];
                    let rows = vec![vec![Value::String(format!("Mock result for: {sql}"))]];
                    ResultBlock::ok(index, sql.clone(), columns, rows)
                } else {
                    ResultBlock::ok(index, sql.clone(), Vec::new(), Vec::new())
                }
            })
            .collect();

        Ok(blocks)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_default_select() {
        let client = MockDatabaseClient::new();
        let blocks = client
            .execute_read(&["SELECT 1".to_string()])
            .await
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(!blocks[0].is_error());
        assert_eq!(blocks[0].row_count, 1);
    }

    #[tokio::test]
    async fn test_mock_default_non_select() {
        let client = MockDatabaseClient::new();
        let blocks = client
            .execute_read(&["INSERT INTO test VALUES (1)".to_string()])
            .await
            .unwrap();
        assert_eq!(blocks[0].row_count, 0);
        assert!(!blocks[0].is_error());
    }

    #[tokio::test]
    async fn test_mock_canned_result() {
        let client = MockDatabaseClient::new().with_result(
            "revenue",
            vec![ColumnInfo::new("total", "numeric")],
            vec![vec![Value::String("1000.00".to_string())]],
        );
        let blocks = client
            .execute_read(&["SELECT SUM(amount) AS total FROM revenue".to_string()])
            .await
            .unwrap();
        assert_eq!(blocks[0].rows, vec![vec![Value::String("1000.00".to_string())]]);
    }

    #[tokio::test]
    async fn test_mock_failure_pattern() {
        let client = MockDatabaseClient::new().with_failure("bad_table", "relation does not exist");
        let blocks = client
            .execute_read(&["SELECT * FROM bad_table".to_string()])
            .await
            .unwrap();
        assert!(blocks[0].is_error());
        assert_eq!(blocks[0].error.as_deref(), Some("relation does not exist"));
    }

    #[tokio::test]
    async fn test_mock_partial_batch_failure() {
        let client = MockDatabaseClient::new().with_failure("bad_table", "nope");
        let blocks = client
            .execute_read(&[
                "SELECT 1".to_string(),
                "SELECT * FROM bad_table".to_string(),
                "SELECT 2".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(blocks.len(), 3);
        assert!(!blocks[0].is_error());
        assert!(blocks[1].is_error());
        assert!(!blocks[2].is_error());
    }

    #[tokio::test]
    async fn test_mock_call_count() {
        let client = MockDatabaseClient::new();
        client
            .execute_read(&["SELECT 1".to_string(), "SELECT 2".to_string()])
            .await
            .unwrap();
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_with_schema() {
        let schema = Schema::default();
        let client = MockDatabaseClient::with_schema(schema.clone());
        let introspected = client.introspect_schema().await.unwrap();
        assert_eq!(introspected.tables.len(), schema.tables.len());
    }
}
