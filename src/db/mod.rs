//! Database abstraction layer for the analyst engine.
//!
//! A trait-based interface over the analytical database, scoped to what
//! the pipeline needs: read-only schema introspection and read-only
//! statement execution.

mod mock;
mod postgres;
mod schema;
mod types;

pub use mock::MockDatabaseClient;
pub use postgres::PostgresClient;
pub use schema::{Column, ForeignKey, Index, Schema, Table};
pub use types::{ColumnInfo, ResultBlock, Row, Value};

use crate::config::DbConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Creates a database client for the given configuration. PostgreSQL is
/// currently the only supported analytical-database dialect.
pub async fn connect(config: &DbConfig) -> Result<Box<dyn DatabaseClient>> {
    let client = PostgresClient::connect(config).await?;
    Ok(Box::new(client))
}

/// Trait defining the interface for analytical database clients.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Introspects the database schema, returning table, column, and
    /// foreign-key information (with sampled FK value-range hints).
    async fn introspect_schema(&self) -> Result<Schema>;

    /// Executes one or more SQL statements read-only, returning one
    /// `ResultBlock` per statement in input order. A failing statement
    /// yields a `ResultBlock` with `error` set rather than aborting the
    /// batch.
    async fn execute_read(&self, statements: &[String]) -> Result<Vec<ResultBlock>>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
