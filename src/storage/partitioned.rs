//! Hive-style partitioned Parquet output for the columnar layout.
//!
//! One directory per distinct partition key, named `<column>=<value>`, each
//! holding a single `part-0.parquet`. Null keys share the
//! `<column>=__HIVE_DEFAULT_PARTITION__` directory.

use datafusion::arrow::array::{Array, AsArray};
use datafusion::arrow::datatypes::{Int64Type, Schema};
use std::path::{Path, PathBuf};

use super::parquet_writer::write_parquet_file;
use crate::config::ParquetConfig;
use crate::engine::QueryEngine;
use crate::HarnessError;

/// Column the columnar layout is partitioned by (year built).
pub const PARTITION_COLUMN: &str = "date_built";

/// Directory value used for rows whose partition key is null.
pub const NULL_PARTITION_VALUE: &str = "__HIVE_DEFAULT_PARTITION__";

const PARTITION_FILE_NAME: &str = "part-0.parquet";

/// One written partition of the columnar layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Partition key; `None` is the shared null bucket.
    pub key: Option<i64>,
    pub rows: usize,
    pub dir: PathBuf,
}

pub fn partition_dir_name(key: Option<i64>) -> String {
    match key {
        Some(value) => format!("{}={}", PARTITION_COLUMN, value),
        None => format!("{}={}", PARTITION_COLUMN, NULL_PARTITION_VALUE),
    }
}

/// Distinct partition keys of `source`, ascending with the null bucket last.
async fn distinct_keys(
    engine: &dyn QueryEngine,
    source: &str,
) -> Result<Vec<Option<i64>>, HarnessError> {
    let sql = format!(
        "SELECT DISTINCT CAST(\"{col}\" AS BIGINT) AS partition_key FROM \"{source}\" \
         ORDER BY partition_key ASC NULLS LAST",
        col = PARTITION_COLUMN,
        source = source,
    );
    let batches = engine.execute(&sql).await.map_err(|e| {
        HarnessError::Materialization(format!("Failed to list partition keys: {:#}", e))
    })?;

    let mut keys = Vec::new();
    for batch in &batches {
        let column = batch.column(0).as_primitive_opt::<Int64Type>().ok_or_else(|| {
            HarnessError::Materialization("Partition key column is not BIGINT".to_string())
        })?;
        for i in 0..column.len() {
            keys.push(column.is_valid(i).then(|| column.value(i)));
        }
    }
    Ok(keys)
}

/// Write every row of `source` into one Parquet file per partition key.
///
/// Partitions are returned in the same order they were written, which is the
/// order of [`distinct_keys`].
#[tracing::instrument(name = "write_partitions", skip(engine, schema, config), fields(source = %source))]
pub async fn write_partitions(
    engine: &dyn QueryEngine,
    source: &str,
    schema: &Schema,
    output_dir: &Path,
    config: &ParquetConfig,
) -> Result<Vec<PartitionInfo>, HarnessError> {
    let keys = distinct_keys(engine, source).await?;
    let mut partitions = Vec::with_capacity(keys.len());

    for key in keys {
        let predicate = match key {
            Some(value) => format!("\"{}\" = {}", PARTITION_COLUMN, value),
            None => format!("\"{}\" IS NULL", PARTITION_COLUMN),
        };
        let sql = format!("SELECT * FROM \"{}\" WHERE {}", source, predicate);
        let batches = engine.execute(&sql).await.map_err(|e| {
            HarnessError::Materialization(format!(
                "Failed to read partition {}: {:#}",
                partition_dir_name(key),
                e
            ))
        })?;

        let dir = output_dir.join(partition_dir_name(key));
        let written = write_parquet_file(&dir.join(PARTITION_FILE_NAME), &batches, schema, config)?;

        tracing::debug!(
            partition = %partition_dir_name(key),
            rows = written.rows,
            bytes = written.bytes,
            "Wrote partition"
        );

        partitions.push(PartitionInfo {
            key,
            rows: written.rows,
            dir,
        });
    }

    Ok(partitions)
}
