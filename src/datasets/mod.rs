//! Source dataset resolution and normalization.

mod resolver;
pub mod schema;

pub use resolver::DatasetResolver;
pub use schema::{normalize_schema, REQUIRED_COLUMNS};

use datafusion::arrow::datatypes::SchemaRef;
use std::path::{Path, PathBuf};

/// The resolved home sales table. Read-only for the whole run.
#[derive(Debug, Clone)]
pub struct Dataset {
    path: PathBuf,
    schema: SchemaRef,
    row_count: usize,
}

impl Dataset {
    pub fn new(path: PathBuf, schema: SchemaRef, row_count: usize) -> Self {
        Self {
            path,
            schema,
            row_count,
        }
    }

    /// Location of the source CSV.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Normalized schema used to read the CSV.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Rows counted by the validation pass at resolve time.
    pub fn row_count(&self) -> usize {
        self.row_count
    }
}
