use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::datasource::file_format::csv::CsvFormat;
use datafusion::datasource::file_format::parquet::ParquetFormat;
use datafusion::datasource::file_format::FileFormat;
use datafusion::datasource::listing::{
    ListingOptions, ListingTable, ListingTableConfig, ListingTableUrl,
};
use datafusion::datasource::{MemTable, TableProvider};
use datafusion::prelude::{SessionConfig, SessionContext};
use tracing::{debug, info};

use super::QueryEngine;
use crate::config::EngineConfig;

/// In-process DataFusion session used for real benchmark runs.
pub struct DataFusionEngine {
    ctx: SessionContext,
    /// Providers displaced by `cache_table`, restored by `uncache_table`.
    uncached: Mutex<HashMap<String, Arc<dyn TableProvider>>>,
}

impl std::fmt::Debug for DataFusionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFusionEngine")
            .field("session_id", &self.ctx.session_id())
            .finish_non_exhaustive()
    }
}

impl Default for DataFusionEngine {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl DataFusionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let mut session_config = SessionConfig::new().with_batch_size(config.batch_size);
        if let Some(partitions) = config.target_partitions {
            session_config = session_config.with_target_partitions(partitions);
        }

        Self {
            ctx: SessionContext::new_with_config(session_config),
            uncached: Mutex::new(HashMap::new()),
        }
    }

    async fn register_listing(
        &self,
        name: &str,
        location: &Path,
        format: Arc<dyn FileFormat>,
        file_extension: String,
        schema: SchemaRef,
    ) -> Result<()> {
        let table_path = ListingTableUrl::parse(location.to_string_lossy())
            .with_context(|| format!("Failed to parse table location {}", location.display()))?;

        let listing_options = ListingOptions::new(format).with_file_extension(file_extension);

        let config = ListingTableConfig::new(table_path)
            .with_listing_options(listing_options)
            .with_schema(schema);

        let table = ListingTable::try_new(config)
            .with_context(|| format!("Failed to create listing table for {}", name))?;

        self.replace_table(name, Arc::new(table))
    }

    fn replace_table(&self, name: &str, table: Arc<dyn TableProvider>) -> Result<()> {
        self.deregister(name)?;
        self.ctx.register_table(name, table)?;
        debug!(view = %name, "Registered table");
        Ok(())
    }

    /// Serve `name` from `cached`, keeping the source provider for `uncache_table`.
    /// On failure the source provider is registered again.
    fn swap_in_memory(&self, name: &str, cached: Arc<dyn TableProvider>) -> Result<()> {
        let original = self
            .ctx
            .deregister_table(name)?
            .ok_or_else(|| anyhow::anyhow!("Table '{}' disappeared while caching", name))?;
        self.uncached
            .lock()
            .expect("uncached provider lock poisoned")
            .insert(name.to_string(), original.clone());

        if let Err(e) = self.ctx.register_table(name, cached) {
            self.take_original(name);
            self.ctx
                .register_table(name, original)
                .with_context(|| format!("Failed to restore '{}' after a failed cache", name))?;
            return Err(e).with_context(|| format!("Failed to register cached '{}'", name));
        }
        Ok(())
    }

    fn take_original(&self, name: &str) -> Option<Arc<dyn TableProvider>> {
        self.uncached
            .lock()
            .expect("uncached provider lock poisoned")
            .remove(name)
    }
}

#[async_trait]
impl QueryEngine for DataFusionEngine {
    async fn register_csv(&self, name: &str, path: &Path, schema: SchemaRef) -> Result<()> {
        // ListingTable filters by extension even for single-file locations
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        let format = Arc::new(CsvFormat::default().with_has_header(true));
        self.register_listing(name, path, format, extension, schema)
            .await
    }

    async fn register_parquet(&self, name: &str, dir: &Path, schema: SchemaRef) -> Result<()> {
        let format = Arc::new(ParquetFormat::default());
        self.register_listing(name, dir, format, ".parquet".to_string(), schema)
            .await
    }

    fn deregister(&self, name: &str) -> Result<()> {
        self.take_original(name);
        self.ctx.deregister_table(name)?;
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        let df = self.ctx.sql(sql).await?;
        Ok(df.collect().await?)
    }

    #[tracing::instrument(name = "cache_table", skip(self), fields(view = %name))]
    async fn cache_table(&self, name: &str) -> Result<usize> {
        // Start from the source provider so a re-cache is a fresh forcing pass
        if self.is_cached(name).await? {
            self.uncache_table(name).await?;
        }

        let df = self.ctx.table(name).await?;
        let schema: SchemaRef = df.schema().inner().clone();
        let partitions = df.collect_partitioned().await?;
        let rows: usize = partitions.iter().flatten().map(|b| b.num_rows()).sum();

        let mem_table = MemTable::try_new(schema, partitions)
            .with_context(|| format!("Failed to build in-memory table for {}", name))?;

        self.swap_in_memory(name, Arc::new(mem_table))?;

        info!(view = %name, rows, "Table cached in memory");
        Ok(rows)
    }

    async fn uncache_table(&self, name: &str) -> Result<()> {
        let Some(original) = self.take_original(name) else {
            return Ok(());
        };
        self.ctx.deregister_table(name)?;
        self.ctx.register_table(name, original)?;
        info!(view = %name, "Table cache cleared");
        Ok(())
    }

    async fn is_cached(&self, name: &str) -> Result<bool> {
        let provider = self.ctx.table_provider(name).await?;
        Ok(provider.as_any().is::<MemTable>())
    }
}
