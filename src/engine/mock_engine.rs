//! Mock engine implementation for testing.
//!
//! Wraps a real `DataFusionEngine` and can be configured to fail or to
//! misbehave at specific seams, so the harness's failure handling can be
//! exercised without a broken environment.

use super::{DataFusionEngine, QueryEngine};
use anyhow::Result;
use async_trait::async_trait;
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::arrow::record_batch::RecordBatch;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock engine that can be configured to fail for testing error handling.
#[derive(Debug, Default)]
pub struct MockEngine {
    inner: DataFusionEngine,
    fail_parquet_registration: AtomicBool,
    ignore_cache_requests: AtomicBool,
    failing_sql: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
    cache_calls: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every Parquet registration fail.
    pub fn set_fail_parquet_registration(&self, fail: bool) {
        self.fail_parquet_registration.store(fail, Ordering::SeqCst);
    }

    /// Acknowledge cache requests without caching anything.
    pub fn set_ignore_cache_requests(&self, ignore: bool) {
        self.ignore_cache_requests.store(ignore, Ordering::SeqCst);
    }

    /// Fail any statement whose text contains `fragment`.
    pub fn fail_sql_containing(&self, fragment: &str) {
        self.failing_sql.lock().unwrap().push(fragment.to_string());
    }

    /// Every statement passed to `execute`, in order.
    pub fn executed_sql(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// Number of `cache_table` calls received.
    pub fn cache_calls(&self) -> usize {
        self.cache_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryEngine for MockEngine {
    async fn register_csv(&self, name: &str, path: &Path, schema: SchemaRef) -> Result<()> {
        self.inner.register_csv(name, path, schema).await
    }

    async fn register_parquet(&self, name: &str, dir: &Path, schema: SchemaRef) -> Result<()> {
        if self.fail_parquet_registration.load(Ordering::SeqCst) {
            anyhow::bail!("Mock parquet registration failure for '{}'", name);
        }
        self.inner.register_parquet(name, dir, schema).await
    }

    fn deregister(&self, name: &str) -> Result<()> {
        self.inner.deregister(name)
    }

    async fn execute(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        self.executed.lock().unwrap().push(sql.to_string());
        let should_fail = self
            .failing_sql
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| sql.contains(fragment.as_str()));
        if should_fail {
            anyhow::bail!("Mock query failure");
        }
        self.inner.execute(sql).await
    }

    async fn cache_table(&self, name: &str) -> Result<usize> {
        self.cache_calls.fetch_add(1, Ordering::SeqCst);
        if self.ignore_cache_requests.load(Ordering::SeqCst) {
            // Report a plausible row count while leaving the table uncached
            let batches = self
                .inner
                .execute(&format!("SELECT * FROM \"{}\"", name))
                .await?;
            return Ok(batches.iter().map(|b| b.num_rows()).sum());
        }
        self.inner.cache_table(name).await
    }

    async fn uncache_table(&self, name: &str) -> Result<()> {
        self.inner.uncache_table(name).await
    }

    async fn is_cached(&self, name: &str) -> Result<bool> {
        self.inner.is_cached(name).await
    }
}
