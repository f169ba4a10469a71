//! Physical layouts under benchmark and the materializer that produces them.

mod parquet_writer;
mod partitioned;

pub use parquet_writer::{write_parquet_file, WrittenFile};
pub use partitioned::{
    partition_dir_name, write_partitions, PartitionInfo, NULL_PARTITION_VALUE, PARTITION_COLUMN,
};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ParquetConfig;
use crate::datasets::Dataset;
use crate::engine::QueryEngine;
use crate::HarnessError;

/// Staging table the columnar writer reads the source CSV through.
const STAGING_TABLE: &str = "home_sales_staging";

/// Directory under the work dir holding the partitioned Parquet tree.
const COLUMNAR_DIR_NAME: &str = "home_sales_partitioned";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageLayout {
    /// The uncompressed source CSV, read as-is.
    Row,
    /// Parquet, one directory per year-built value.
    Columnar,
}

impl StorageLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageLayout::Row => "csv",
            StorageLayout::Columnar => "parquet",
        }
    }

    /// Engine table name of this layout's view. One live view per layout.
    pub fn view_name(&self) -> &'static str {
        match self {
            StorageLayout::Row => "home_sales_csv",
            StorageLayout::Columnar => "home_sales_parquet",
        }
    }
}

impl fmt::Display for StorageLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, queryable handle over the dataset in one layout.
#[derive(Debug, Clone)]
pub struct View {
    pub name: String,
    pub layout: StorageLayout,
    /// CSV file for the row layout, partition root for the columnar one.
    pub location: PathBuf,
    /// Written partitions in key order; empty for the row layout.
    pub partitions: Vec<PartitionInfo>,
    /// Rows the view must serve, as counted when the dataset was resolved.
    pub row_count: usize,
    /// Last cache state confirmed against the engine.
    pub cached: bool,
}

impl View {
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

/// Produces the row and columnar views of a dataset.
#[derive(Debug)]
pub struct StorageMaterializer {
    engine: Arc<dyn QueryEngine>,
    work_dir: PathBuf,
    parquet: ParquetConfig,
}

impl StorageMaterializer {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        work_dir: impl Into<PathBuf>,
        parquet: ParquetConfig,
    ) -> Self {
        Self {
            engine,
            work_dir: work_dir.into(),
            parquet,
        }
    }

    /// Root of the partitioned Parquet tree.
    pub fn columnar_dir(&self) -> PathBuf {
        self.work_dir.join(COLUMNAR_DIR_NAME)
    }

    /// Produce `layout` from `dataset` and register it, retiring any previous
    /// view of the same layout.
    #[tracing::instrument(name = "materialize", skip(self, dataset), fields(layout = %layout))]
    pub async fn materialize(
        &self,
        dataset: &Dataset,
        layout: StorageLayout,
    ) -> Result<View, HarnessError> {
        match layout {
            StorageLayout::Row => self.materialize_row(dataset).await,
            StorageLayout::Columnar => self.materialize_columnar(dataset).await,
        }
    }

    async fn materialize_row(&self, dataset: &Dataset) -> Result<View, HarnessError> {
        let name = StorageLayout::Row.view_name();
        self.engine
            .register_csv(name, dataset.path(), dataset.schema())
            .await
            .map_err(|e| {
                HarnessError::Materialization(format!("Failed to register {}: {:#}", name, e))
            })?;

        info!(view = %name, path = %dataset.path().display(), "Row view registered");

        Ok(View {
            name: name.to_string(),
            layout: StorageLayout::Row,
            location: dataset.path().to_path_buf(),
            partitions: Vec::new(),
            row_count: dataset.row_count(),
            cached: false,
        })
    }

    async fn materialize_columnar(&self, dataset: &Dataset) -> Result<View, HarnessError> {
        let name = StorageLayout::Columnar.view_name();
        let output_dir = self.columnar_dir();

        // Retire the previous view before its files disappear
        self.engine.deregister(name).map_err(|e| {
            HarnessError::Materialization(format!("Failed to retire {}: {:#}", name, e))
        })?;
        reset_dir(&output_dir)?;

        self.engine
            .register_csv(STAGING_TABLE, dataset.path(), dataset.schema())
            .await
            .map_err(|e| {
                HarnessError::Materialization(format!("Failed to stage source CSV: {:#}", e))
            })?;

        let written = write_partitions(
            self.engine.as_ref(),
            STAGING_TABLE,
            dataset.schema().as_ref(),
            &output_dir,
            &self.parquet,
        )
        .await;

        if let Err(e) = self.engine.deregister(STAGING_TABLE) {
            warn!(error = %e, "Failed to drop staging table");
        }
        let partitions = written?;

        let rows_written: usize = partitions.iter().map(|p| p.rows).sum();
        if rows_written != dataset.row_count() {
            return Err(HarnessError::Materialization(format!(
                "Partitioned output has {} rows, dataset has {}",
                rows_written,
                dataset.row_count()
            )));
        }

        self.engine
            .register_parquet(name, &output_dir, dataset.schema())
            .await
            .map_err(|e| {
                HarnessError::Materialization(format!("Failed to register {}: {:#}", name, e))
            })?;

        info!(
            view = %name,
            partitions = partitions.len(),
            rows = rows_written,
            path = %output_dir.display(),
            "Columnar view registered"
        );

        Ok(View {
            name: name.to_string(),
            layout: StorageLayout::Columnar,
            location: output_dir,
            partitions,
            row_count: rows_written,
            cached: false,
        })
    }
}

/// Remove any previous output and recreate `dir` empty.
fn reset_dir(dir: &Path) -> Result<(), HarnessError> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|e| {
            HarnessError::Materialization(format!(
                "Failed to remove previous output {}: {}",
                dir.display(),
                e
            ))
        })?;
    }
    std::fs::create_dir_all(dir).map_err(|e| {
        HarnessError::Materialization(format!(
            "Output directory {} is not writable: {}",
            dir.display(),
            e
        ))
    })
}
