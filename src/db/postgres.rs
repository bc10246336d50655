//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient`
//! trait for the analytical PostgreSQL database using sqlx. All statement
//! execution happens inside a `SET TRANSACTION READ ONLY` transaction, and
//! multi-statement batches isolate per-statement failures into `ResultBlock`s
//! rather than aborting the whole batch.

use crate::config::DbConfig;
use crate::db::{
    Column, ColumnInfo, DatabaseClient, ForeignKey, Index, ResultBlock, Row, Schema, Table, Value,
};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use futures::future::join_all;
use futures::StreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo};
use std::time::Duration;
use tracing::{debug, warn};

/// Query timeout in seconds.
const QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum rows to return from a single statement.
const MAX_ROWS: usize = 1000;

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Maximum number of sampled distinct values per foreign-key value-range hint.
const MAX_FK_VALUES: usize = 30;

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Creates a new PostgresClient from an existing connection pool.
    ///
    /// This is primarily useful for testing.
    #[allow(dead_code)]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database using the provided configuration.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let conn_str = config.connection_string()?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(config.pool_size)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Successfully connected to database");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(map_connection_error(
            last_error.expect("at least one attempt was made"),
            config,
        ))
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn introspect_schema(&self) -> Result<Schema> {
        let (table_names_result, columns_result, pks_result, indexes_result, fks_result) = tokio::join!(
            self.fetch_table_names(),
            self.fetch_all_columns(),
            self.fetch_all_primary_keys(),
            self.fetch_all_indexes(),
            self.fetch_foreign_keys(),
        );

        let table_names = table_names_result?;
        let columns_by_table = columns_result?;
        let pks_by_table = pks_result?;
        let indexes_by_table = indexes_result?;
        let foreign_keys = fks_result?;

        let tables = table_names
            .into_iter()
            .map(|name| {
                let columns = columns_by_table.get(&name).cloned().unwrap_or_default();
                let primary_key = pks_by_table.get(&name).cloned().unwrap_or_default();
                let indexes = indexes_by_table.get(&name).cloned().unwrap_or_default();
                Table {
                    name,
                    columns,
                    primary_key,
                    indexes,
                }
            })
            .collect();

        let hint_futures = foreign_keys.iter().map(|fk| {
            let column = fk.to_columns.first().cloned();
            let table = fk.to_table.clone();
            async move {
                match column {
                    Some(column) => self.fetch_fk_value_range(&table, &column).await,
                    None => Vec::new(),
                }
            }
        });
        let hints = join_all(hint_futures).await;
        let foreign_keys = foreign_keys
            .into_iter()
            .zip(hints)
            .map(|(fk, hint)| fk.with_value_range_hint(hint))
            .collect();

        Ok(Schema {
            tables,
            foreign_keys,
        })
    }

    async fn execute_read(&self, statements: &[String]) -> Result<Vec<ResultBlock>> {
        let mut blocks = Vec::with_capacity(statements.len());

        for (index, sql) in statements.iter().enumerate() {
            match self.execute_one(sql).await {
                Ok((columns, rows, was_truncated)) => {
                    if was_truncated {
                        warn!(
                            "Statement {} exceeded {} rows, result truncated",
                            index, MAX_ROWS
                        );
                    }
                    blocks.push(ResultBlock::ok(index, sql.clone(), columns, rows));
                }
                Err(e) => {
                    blocks.push(ResultBlock::failed(index, sql.clone(), e.to_string()));
                }
            }
        }

        Ok(blocks)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

impl PostgresClient {
    /// Runs a single statement inside a read-only transaction, streaming rows
    /// with early termination once `MAX_ROWS` is exceeded. The transaction is
    /// always rolled back afterward since a read-only statement has nothing
    /// to commit.
    async fn execute_one(&self, sql: &str) -> Result<(Vec<ColumnInfo>, Vec<Row>, bool)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::db(format_query_error(e)))?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| EngineError::db(format_query_error(e)))?;

        let fetch_result = tokio::time::timeout(Duration::from_secs(QUERY_TIMEOUT_SECS), async {
            let mut stream = sqlx::query(sql).fetch(&mut *tx);
            let mut rows: Vec<Row> = Vec::new();
            let mut columns: Option<Vec<ColumnInfo>> = None;
            let mut was_truncated = false;

            while let Some(row_result) = stream.next().await {
                let pg_row = row_result.map_err(|e| EngineError::db(format_query_error(e)))?;

                if columns.is_none() {
                    columns = Some(
                        pg_row
                            .columns()
                            .iter()
                            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                            .collect(),
                    );
                }

                if rows.len() < MAX_ROWS {
                    rows.push(convert_row(&pg_row));
                } else {
                    was_truncated = true;
                    break;
                }
            }

            Ok::<_, EngineError>((columns.unwrap_or_default(), rows, was_truncated))
        })
        .await;

        // Read-only, nothing to preserve either way.
        let _ = tx.rollback().await;

        fetch_result.map_err(|_| {
            EngineError::db_timeout(format!(
                "Query timed out after {QUERY_TIMEOUT_SECS} seconds"
            ))
        })?
    }

    /// Samples up to `MAX_FK_VALUES` distinct values of a referenced column,
    /// for use as a foreign-key value-range hint. Best-effort: any failure
    /// (permissions, exotic column type) degrades to an empty hint rather
    /// than failing introspection.
    async fn fetch_fk_value_range(&self, table: &str, column: &str) -> Vec<String> {
        let query = format!(
            "SELECT DISTINCT \"{column}\"::text FROM \"{table}\" \
             WHERE \"{column}\" IS NOT NULL ORDER BY 1 LIMIT {MAX_FK_VALUES}"
        );
        sqlx::query_scalar::<_, String>(&query)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_default()
    }

    /// Fetches all table names from the public schema.
    async fn fetch_table_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::db(format!("Failed to fetch tables: {e}")))
    }

    /// Fetches all columns for all tables in one query, grouped by table name.
    async fn fetch_all_columns(&self) -> Result<std::collections::HashMap<String, Vec<Column>>> {
        let rows: Vec<(String, String, String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT
                table_name::text,
                column_name::text,
                data_type::text,
                is_nullable::text,
                column_default::text
            FROM information_schema.columns
            WHERE table_schema = 'public'
            ORDER BY table_name, ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::db(format!("Failed to fetch columns: {e}")))?;

        let mut columns_by_table: std::collections::HashMap<String, Vec<Column>> =
            std::collections::HashMap::new();

        for (table_name, column_name, data_type, is_nullable, default) in rows {
            columns_by_table
                .entry(table_name)
                .or_default()
                .push(Column {
                    name: column_name,
                    data_type,
                    is_nullable: is_nullable == "YES",
                    default,
                });
        }

        Ok(columns_by_table)
    }

    /// Fetches all primary keys for all tables in one query, grouped by table name.
    async fn fetch_all_primary_keys(
        &self,
    ) -> Result<std::collections::HashMap<String, Vec<String>>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT
                tc.table_name::text,
                kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.table_schema = 'public'
                AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY tc.table_name, kcu.ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::db(format!("Failed to fetch primary keys: {e}")))?;

        let mut pks_by_table: std::collections::HashMap<String, Vec<String>> =
            std::collections::HashMap::new();

        for (table_name, column_name) in rows {
            pks_by_table
                .entry(table_name)
                .or_default()
                .push(column_name);
        }

        Ok(pks_by_table)
    }

    /// Fetches all indexes for all tables in one query, grouped by table name.
    async fn fetch_all_indexes(&self) -> Result<std::collections::HashMap<String, Vec<Index>>> {
        let rows: Vec<(String, String, String, bool)> = sqlx::query_as(
            r#"
            SELECT
                t.relname::text AS table_name,
                i.relname::text AS index_name,
                a.attname::text AS column_name,
                ix.indisunique AS is_unique
            FROM pg_class t
            JOIN pg_index ix ON t.oid = ix.indrelid
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            JOIN pg_namespace n ON n.oid = t.relnamespace
            WHERE n.nspname = 'public'
                AND NOT ix.indisprimary
            ORDER BY t.relname, i.relname, a.attnum
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::db(format!("Failed to fetch indexes: {e}")))?;

        let mut indexes_by_table: std::collections::HashMap<String, Vec<Index>> =
            std::collections::HashMap::new();
        let mut current_index: Option<(String, String, Vec<String>, bool)> = None;

        for (table_name, index_name, column_name, is_unique) in rows {
            match &mut current_index {
                Some((cur_table, cur_idx, columns, _))
                    if cur_table == &table_name && cur_idx == &index_name =>
                {
                    columns.push(column_name);
                }
                _ => {
                    if let Some((prev_table, prev_idx, columns, unique)) = current_index.take() {
                        indexes_by_table.entry(prev_table).or_default().push(Index {
                            name: prev_idx,
                            columns,
                            is_unique: unique,
                        });
                    }
                    current_index = Some((table_name, index_name, vec![column_name], is_unique));
                }
            }
        }

        if let Some((table_name, index_name, columns, is_unique)) = current_index {
            indexes_by_table.entry(table_name).or_default().push(Index {
                name: index_name,
                columns,
                is_unique,
            });
        }

        Ok(indexes_by_table)
    }

    /// Fetches all foreign key relationships (value-range hints are filled
    /// in separately by `introspect_schema`).
    async fn fetch_foreign_keys(&self) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                kcu.table_name::text AS from_table,
                kcu.column_name::text AS from_column,
                ccu.table_name::text AS to_table,
                ccu.column_name::text AS to_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON tc.constraint_name = ccu.constraint_name
                AND tc.table_schema = ccu.table_schema
            WHERE tc.table_schema = 'public'
                AND tc.constraint_type = 'FOREIGN KEY'
            ORDER BY kcu.table_name, kcu.ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::db(format!("Failed to fetch foreign keys: {e}")))?;

        let mut fk_map: std::collections::HashMap<(String, String), (Vec<String>, Vec<String>)> =
            std::collections::HashMap::new();

        for (from_table, from_column, to_table, to_column) in rows {
            let key = (from_table, to_table);
            let entry = fk_map
                .entry(key)
                .or_insert_with(|| (Vec::new(), Vec::new()));
            entry.0.push(from_column);
            entry.1.push(to_column);
        }

        Ok(fk_map
            .into_iter()
            .map(|((from_table, to_table), (from_columns, to_columns))| {
                ForeignKey::new(from_table, from_columns, to_table, to_columns)
            })
            .collect())
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type. Timestamps
/// and arbitrary-precision numerics are coerced to strings here so that
/// downstream JSON rendering (`Value::to_json_safe`) never has to reason
/// about precision loss.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "NUMERIC" | "DECIMAL" => row
            .try_get::<Option<rust_decimal::Decimal>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),

        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null),

        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_rfc3339()))
            .unwrap_or(Value::Null),

        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),

        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
    {
        return true;
    }

    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("does not exist")
        || error_str.contains("ssl")
        || error_str.contains("tls")
    {
        return false;
    }

    false
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &DbConfig) -> EngineError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        EngineError::db(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        EngineError::db(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        EngineError::db(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        EngineError::db("Server requires SSL. Add '?sslmode=require' to connection string.")
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        EngineError::db_timeout(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        EngineError::db(error.to_string())
    }
}

/// Formats a query error with hints if available.
fn format_query_error(error: sqlx::Error) -> String {
    let error_str = error.to_string();
    let mut result = String::new();

    if let Some(db_error) = error.as_database_error() {
        result.push_str("ERROR: ");
        result.push_str(db_error.message());

        if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
            if let Some(detail) = pg_error.detail() {
                result.push_str("\n  DETAIL: ");
                result.push_str(detail);
            }
            if let Some(hint) = pg_error.hint() {
                result.push_str("\n  HINT: ");
                result.push_str(hint);
            }
            if let Some(table) = pg_error.table() {
                result.push_str("\n  TABLE: ");
                result.push_str(table);
            }
            if let Some(column) = pg_error.column() {
                result.push_str("\n  COLUMN: ");
                result.push_str(column);
            }
            if let Some(constraint) = pg_error.constraint() {
                result.push_str("\n  CONSTRAINT: ");
                result.push_str(constraint);
            }
        }
    } else {
        result = error_str;
    }

    result
}
