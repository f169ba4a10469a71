use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that points at the source CSV.
pub const DATASET_PATH_ENV: &str = "HOME_SALES_CSV";

/// File name of the home sales dataset, both on disk and at the remote source.
pub const DATASET_FILE_NAME: &str = "home_sales_revised.csv";

const DEFAULT_DOWNLOAD_URL: &str =
    "https://2u-data-curriculum-team.s3.amazonaws.com/dataviz-classroom/v1.2/22-big-data/home_sales_revised.csv";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BenchConfig {
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub parquet: ParquetConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetConfig {
    /// Explicit path to the source CSV. Overridden by HOME_SALES_CSV.
    pub path: Option<String>,
    /// Well-known locations tried when no explicit path is usable.
    #[serde(default = "default_search_paths")]
    pub search_paths: Vec<String>,
    #[serde(default = "default_download_url")]
    pub download_url: String,
    /// Where a fetched copy is persisted and looked up on later runs.
    #[serde(default = "default_download_dir")]
    pub download_dir: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: None,
            search_paths: default_search_paths(),
            download_url: default_download_url(),
            download_dir: default_download_dir(),
        }
    }
}

fn default_search_paths() -> Vec<String> {
    vec![
        DATASET_FILE_NAME.to_string(),
        format!("data/{}", DATASET_FILE_NAME),
        format!("../{}", DATASET_FILE_NAME),
    ]
}

fn default_download_url() -> String {
    DEFAULT_DOWNLOAD_URL.to_string()
}

fn default_download_dir() -> String {
    "data".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Root directory for the partitioned Parquet layout.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    /// Aggregated report location. Overwritten on every run.
    #[serde(default = "default_report_path")]
    pub report_path: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            report_path: default_report_path(),
        }
    }
}

fn default_work_dir() -> String {
    "_parquet_cache".to_string()
}

fn default_report_path() -> String {
    "reports/benchmarks.csv".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Untimed executions of each query before measuring.
    #[serde(default)]
    pub warmup_runs: u32,
    /// Timed executions of each query; the record keeps their mean.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            warmup_runs: 0,
            iterations: default_iterations(),
        }
    }
}

fn default_iterations() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// DataFusion target partitions. Defaults to the engine's choice (CPU count).
    pub target_partitions: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_partitions: None,
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    8192
}

/// Configuration for parquet file writing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParquetConfig {
    #[serde(default = "default_max_row_group_size")]
    pub max_row_group_size: usize,
}

impl Default for ParquetConfig {
    fn default() -> Self {
        Self {
            max_row_group_size: default_max_row_group_size(),
        }
    }
}

fn default_max_row_group_size() -> usize {
    100_000
}

impl BenchConfig {
    /// Load configuration from an optional file and environment variables
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Add environment variables with prefix HOMEBENCH_
        // Example: HOMEBENCH_RUN__ITERATIONS=3
        builder = builder.add_source(
            config::Environment::with_prefix("HOMEBENCH")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut bench: BenchConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if let Ok(path) = std::env::var(DATASET_PATH_ENV) {
            if !path.trim().is_empty() {
                bench.dataset.path = Some(path);
            }
        }

        Ok(bench)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.run.iterations == 0 {
            anyhow::bail!("run.iterations must be at least 1");
        }
        if self.engine.batch_size == 0 {
            anyhow::bail!("engine.batch_size must be at least 1");
        }
        if self.engine.target_partitions == Some(0) {
            anyhow::bail!("engine.target_partitions must be at least 1 when set");
        }
        if self.parquet.max_row_group_size == 0 {
            anyhow::bail!("parquet.max_row_group_size must be at least 1");
        }
        if self.paths.report_path.trim().is_empty() {
            anyhow::bail!("paths.report_path cannot be empty");
        }
        if self.paths.work_dir.trim().is_empty() {
            anyhow::bail!("paths.work_dir cannot be empty");
        }
        Ok(())
    }

    pub fn report_path(&self) -> PathBuf {
        PathBuf::from(&self.paths.report_path)
    }

    pub fn work_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.work_dir)
    }
}
