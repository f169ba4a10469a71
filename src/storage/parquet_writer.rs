//! Parquet file output for one partition of the columnar layout.

use datafusion::arrow::datatypes::Schema;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::parquet::arrow::ArrowWriter;
use datafusion::parquet::basic::Compression;
use datafusion::parquet::file::properties::{WriterProperties, WriterVersion};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::config::ParquetConfig;
use crate::HarnessError;

/// What ended up on disk for one partition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenFile {
    pub rows: usize,
    pub bytes: u64,
}

fn writer_properties(config: &ParquetConfig) -> WriterProperties {
    WriterProperties::builder()
        .set_writer_version(WriterVersion::PARQUET_2_0)
        .set_compression(Compression::LZ4)
        .set_max_row_group_size(config.max_row_group_size)
        .build()
}

fn write_error(path: &Path, e: impl std::fmt::Display) -> HarnessError {
    HarnessError::Materialization(format!("Failed to write {}: {}", path.display(), e))
}

/// Write `batches` to a single Parquet file at `path`, creating its directory.
///
/// The file schema is taken from the first batch, since collected batches can
/// carry engine-side field metadata; `schema` is only used when there are none.
pub fn write_parquet_file(
    path: &Path,
    batches: &[RecordBatch],
    schema: &Schema,
    config: &ParquetConfig,
) -> Result<WrittenFile, HarnessError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            HarnessError::Materialization(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let file_schema = match batches.first() {
        Some(first) => first.schema(),
        None => Arc::new(schema.clone()),
    };

    let file = File::create(path).map_err(|e| write_error(path, e))?;
    let mut writer = ArrowWriter::try_new(file, file_schema, Some(writer_properties(config)))
        .map_err(|e| write_error(path, e))?;

    let mut rows = 0;
    for batch in batches {
        writer.write(batch).map_err(|e| write_error(path, e))?;
        rows += batch.num_rows();
    }
    writer.close().map_err(|e| write_error(path, e))?;

    let bytes = std::fs::metadata(path)
        .map_err(|e| write_error(path, e))?
        .len();

    Ok(WrittenFile { rows, bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::Int64Array;
    use datafusion::arrow::datatypes::{DataType, Field};
    use datafusion::parquet::file::reader::{FileReader, SerializedFileReader};
    use tempfile::tempdir;

    fn year_batch(schema: &Schema, years: Vec<i64>) -> RecordBatch {
        RecordBatch::try_new(
            Arc::new(schema.clone()),
            vec![Arc::new(Int64Array::from(years))],
        )
        .unwrap()
    }

    #[test]
    fn test_writes_every_batch_with_lz4() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("date_built=1990").join("part-0.parquet");
        let schema = Schema::new(vec![Field::new("date_built", DataType::Int64, true)]);
        let batches = vec![
            year_batch(&schema, vec![1990, 1990, 1990]),
            year_batch(&schema, vec![1990, 1990]),
        ];

        let written =
            write_parquet_file(&path, &batches, &schema, &ParquetConfig::default()).unwrap();

        assert_eq!(written.rows, 5);
        assert!(written.bytes > 0);

        let reader = SerializedFileReader::new(File::open(&path).unwrap()).unwrap();
        let metadata = reader.metadata();
        assert_eq!(metadata.file_metadata().num_rows(), 5);
        assert!(matches!(
            metadata.row_group(0).column(0).compression(),
            Compression::LZ4
        ));
    }

    #[test]
    fn test_row_groups_follow_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part-0.parquet");
        let schema = Schema::new(vec![Field::new("date_built", DataType::Int64, true)]);
        let batches = vec![year_batch(&schema, (0..10).collect())];
        let config = ParquetConfig {
            max_row_group_size: 4,
        };

        write_parquet_file(&path, &batches, &schema, &config).unwrap();

        let reader = SerializedFileReader::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(reader.metadata().num_row_groups(), 3);
    }

    #[test]
    fn test_no_batches_writes_empty_file_with_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part-0.parquet");
        let schema = Schema::new(vec![Field::new("date_built", DataType::Int64, true)]);

        let written = write_parquet_file(&path, &[], &schema, &ParquetConfig::default()).unwrap();

        assert_eq!(written.rows, 0);
        assert!(path.is_file());
    }

    #[test]
    fn test_under_a_file_fails() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);

        let err = write_parquet_file(
            &blocker.join("part-0.parquet"),
            &[],
            &schema,
            &ParquetConfig::default(),
        )
        .unwrap_err();

        assert!(matches!(err, HarnessError::Materialization(_)));
    }
}
