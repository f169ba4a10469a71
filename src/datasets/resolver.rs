use datafusion::arrow::array::AsArray;
use datafusion::arrow::csv::reader::Format;
use datafusion::arrow::datatypes::{Int64Type, Schema};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::schema::{normalize_schema, REQUIRED_COLUMNS};
use super::Dataset;
use crate::config::{DatasetConfig, DATASET_FILE_NAME};
use crate::engine::QueryEngine;
use crate::HarnessError;

/// Table name used while validating the source file.
const VALIDATION_TABLE: &str = "home_sales_source";

/// Rows read when inferring the CSV schema.
const SCHEMA_INFERENCE_ROWS: usize = 10_000;

/// Infer column types from the header and the first rows of a CSV file.
fn infer_csv_schema(path: &Path) -> anyhow::Result<Schema> {
    let file = File::open(path)?;
    let (schema, _) = Format::default()
        .with_header(true)
        .infer_schema(BufReader::new(file), Some(SCHEMA_INFERENCE_ROWS))?;
    Ok(schema)
}

/// Locates (or fetches) the home sales CSV and turns it into a [`Dataset`].
#[derive(Debug)]
pub struct DatasetResolver {
    config: DatasetConfig,
    engine: Arc<dyn QueryEngine>,
}

impl DatasetResolver {
    pub fn new(config: DatasetConfig, engine: Arc<dyn QueryEngine>) -> Self {
        Self { config, engine }
    }

    /// Locate the source file and validate it.
    ///
    /// Repeated calls reuse the local copy written by an earlier fetch.
    #[tracing::instrument(name = "resolve_dataset", skip(self))]
    pub async fn resolve(&self) -> Result<Dataset, HarnessError> {
        let path = self.locate().await?;
        self.load(&path).await
    }

    /// Find a readable local copy, fetching it only when none exists.
    pub async fn locate(&self) -> Result<PathBuf, HarnessError> {
        if let Some(hint) = &self.config.path {
            let hint = PathBuf::from(hint);
            if hint.is_file() {
                info!(path = %hint.display(), "Using dataset from explicit path");
                return Ok(hint);
            }
            warn!(
                path = %hint.display(),
                "Explicit dataset path does not exist, trying default locations"
            );
        }

        for candidate in &self.config.search_paths {
            let candidate = PathBuf::from(candidate);
            if candidate.is_file() {
                info!(path = %candidate.display(), "Found dataset locally");
                return Ok(candidate);
            }
        }

        let target = self.download_target();
        if target.is_file() {
            info!(path = %target.display(), "Reusing previously downloaded dataset");
            return Ok(target);
        }

        self.fetch(&target).await?;
        Ok(target)
    }

    /// Where a fetched copy lives.
    pub fn download_target(&self) -> PathBuf {
        Path::new(&self.config.download_dir).join(DATASET_FILE_NAME)
    }

    async fn fetch(&self, target: &Path) -> Result<(), HarnessError> {
        let url = &self.config.download_url;
        info!(url = %url, target = %target.display(), "Dataset not found locally, downloading");

        let unavailable =
            |e: reqwest::Error| HarnessError::DatasetUnavailable(format!("fetch from {} failed: {}", url, e));

        let response = reqwest::get(url.as_str()).await.map_err(unavailable)?;
        let response = response.error_for_status().map_err(unavailable)?;
        let body = response.bytes().await.map_err(unavailable)?;

        let persist_err = |e: std::io::Error| {
            HarnessError::DatasetUnavailable(format!(
                "failed to persist dataset to {}: {}",
                target.display(),
                e
            ))
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(persist_err)?;
        }

        // Rename into place so an interrupted download is never picked up later
        let partial = target.with_extension("csv.part");
        tokio::fs::write(&partial, &body).await.map_err(persist_err)?;
        tokio::fs::rename(&partial, target).await.map_err(persist_err)?;

        info!(bytes = body.len(), path = %target.display(), "Dataset downloaded");
        Ok(())
    }

    /// Infer and normalize the schema, then scan the file once through the
    /// engine to count rows and prove every required column parses.
    pub async fn load(&self, path: &Path) -> Result<Dataset, HarnessError> {
        let unreadable = |e: &dyn std::fmt::Display| {
            HarnessError::DatasetUnavailable(format!("cannot read {}: {}", path.display(), e))
        };

        let inference_path = path.to_path_buf();
        let inferred = tokio::task::spawn_blocking(move || infer_csv_schema(&inference_path))
            .await
            .map_err(|e| unreadable(&e))?
            .map_err(|e| unreadable(&format!("{:#}", e)))?;

        let schema = normalize_schema(&inferred)?;

        self.engine
            .register_csv(VALIDATION_TABLE, path, schema.clone())
            .await
            .map_err(|e| unreadable(&format!("{:#}", e)))?;

        let counted = self.count_rows().await;
        if let Err(e) = self.engine.deregister(VALIDATION_TABLE) {
            warn!(error = %e, "Failed to drop validation table");
        }
        let row_count = counted.map_err(|e| unreadable(&format!("{:#}", e)))?;

        info!(
            path = %path.display(),
            rows = row_count,
            columns = schema.fields().len(),
            "Dataset loaded"
        );

        Ok(Dataset::new(path.to_path_buf(), schema, row_count))
    }

    async fn count_rows(&self) -> anyhow::Result<usize> {
        // Aggregating every required column forces each of them to be parsed
        let touched: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .map(|(name, _)| format!("MAX(\"{}\")", name))
            .collect();
        let sql = format!(
            "SELECT COUNT(*) AS row_count, {} FROM \"{}\"",
            touched.join(", "),
            VALIDATION_TABLE
        );

        let batches = self.engine.execute(&sql).await?;
        let batch = batches
            .first()
            .ok_or_else(|| anyhow::anyhow!("row count query returned no batches"))?;
        let counts = batch
            .column(0)
            .as_primitive_opt::<Int64Type>()
            .ok_or_else(|| anyhow::anyhow!("row count is not BIGINT"))?;
        Ok(counts.value(0) as usize)
    }
}
