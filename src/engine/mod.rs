//! Query engine handle passed explicitly through every harness component.

mod datafusion_engine;
mod mock_engine;

use anyhow::Result;
use async_trait::async_trait;
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::arrow::record_batch::RecordBatch;
use std::fmt::Debug;
use std::path::Path;

pub use datafusion_engine::DataFusionEngine;
pub use mock_engine::MockEngine;

/// Async interface over the SQL engine under benchmark.
///
/// Registering a name that already exists replaces the previous table and
/// discards any cache state held for it.
#[async_trait]
pub trait QueryEngine: Debug + Send + Sync {
    /// Register a CSV file with a header row, read with the given schema.
    async fn register_csv(&self, name: &str, path: &Path, schema: SchemaRef) -> Result<()>;

    /// Register a directory tree of Parquet files as one table.
    async fn register_parquet(&self, name: &str, dir: &Path, schema: SchemaRef) -> Result<()>;

    /// Remove a table. Missing tables are not an error.
    fn deregister(&self, name: &str) -> Result<()>;

    /// Execute SQL and collect every result batch.
    async fn execute(&self, sql: &str) -> Result<Vec<RecordBatch>>;

    /// Load the full table into engine memory and serve it from there.
    /// Returns the number of rows loaded by the forcing pass.
    async fn cache_table(&self, name: &str) -> Result<usize>;

    /// Drop the in-memory copy and serve the table from its original source again.
    async fn uncache_table(&self, name: &str) -> Result<()>;

    /// Whether the engine currently serves the table from memory.
    async fn is_cached(&self, name: &str) -> Result<bool>;
}
