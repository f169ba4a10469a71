//! Error types for benchmark harness operations

use thiserror::Error;

/// Errors that can occur while resolving, materializing, caching or querying
/// the benchmark dataset.
///
/// Only `DatasetUnavailable` and `Report` are meant to reach the process
/// boundary; everything else is converted into a failed timing record by the
/// scenario matrix.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// No local copy of the dataset exists and it could not be fetched,
    /// or the file found does not have the expected shape.
    #[error("dataset unavailable: {0}")]
    DatasetUnavailable(String),

    /// Producing or registering a storage layout failed
    #[error("materialization failed: {0}")]
    Materialization(String),

    /// A benchmark query failed to execute or collect
    #[error("query execution failed: {0}")]
    QueryExecution(String),

    /// Engine-reported cache state disagrees with the requested state
    #[error("cache verification failed for view '{view}': requested cached={requested}, engine reports cached={actual}")]
    CacheVerification {
        view: String,
        requested: bool,
        actual: bool,
    },

    /// The durable report could not be written
    #[error("report write failed: {0}")]
    Report(String),
}
