//! The 2×2 layout × cache matrix and the timing records it produces.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::CacheController;
use crate::config::BenchConfig;
use crate::datasets::Dataset;
use crate::engine::QueryEngine;
use crate::queries::{BenchQuery, QueryRunner};
use crate::storage::{StorageLayout, StorageMaterializer, View};
use crate::HarnessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scenario {
    CsvUncached,
    CsvCached,
    ParquetUncached,
    ParquetCached,
}

impl Scenario {
    /// Every scenario, in execution order.
    pub const ALL: [Scenario; 4] = [
        Scenario::CsvUncached,
        Scenario::CsvCached,
        Scenario::ParquetUncached,
        Scenario::ParquetCached,
    ];

    /// Denominator of every speedup ratio.
    pub const BASELINE: Scenario = Scenario::CsvUncached;

    pub fn layout(&self) -> StorageLayout {
        match self {
            Scenario::CsvUncached | Scenario::CsvCached => StorageLayout::Row,
            Scenario::ParquetUncached | Scenario::ParquetCached => StorageLayout::Columnar,
        }
    }

    pub fn cached(&self) -> bool {
        matches!(self, Scenario::CsvCached | Scenario::ParquetCached)
    }

    pub fn id(&self) -> &'static str {
        match self {
            Scenario::CsvUncached => "csv_uncached",
            Scenario::CsvCached => "csv_cached",
            Scenario::ParquetUncached => "parquet_uncached",
            Scenario::ParquetCached => "parquet_cached",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub elapsed: Duration,
    pub row_count: usize,
    pub checksum: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordStatus {
    Measured(Measurement),
    Failed { reason: String },
}

/// One (scenario, query) observation.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingRecord {
    pub scenario: Scenario,
    pub query: BenchQuery,
    pub status: RecordStatus,
}

impl TimingRecord {
    pub fn measured(scenario: Scenario, query: BenchQuery, measurement: Measurement) -> Self {
        Self {
            scenario,
            query,
            status: RecordStatus::Measured(measurement),
        }
    }

    pub fn failed(scenario: Scenario, query: BenchQuery, reason: impl Into<String>) -> Self {
        Self {
            scenario,
            query,
            status: RecordStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn measurement(&self) -> Option<&Measurement> {
        match &self.status {
            RecordStatus::Measured(m) => Some(m),
            RecordStatus::Failed { .. } => None,
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.measurement().map(|m| m.elapsed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, RecordStatus::Failed { .. })
    }
}

/// Drives materialization, cache toggling and query timing for every scenario.
///
/// Runs strictly sequentially. Failures never abort the run: they become
/// failed records for the affected scenario or query.
#[derive(Debug)]
pub struct ScenarioMatrix {
    materializer: StorageMaterializer,
    cache: CacheController,
    runner: QueryRunner,
}

impl ScenarioMatrix {
    pub fn new(engine: Arc<dyn QueryEngine>, config: &BenchConfig) -> Self {
        Self {
            materializer: StorageMaterializer::new(
                engine.clone(),
                config.work_dir(),
                config.parquet.clone(),
            ),
            cache: CacheController::new(engine.clone()),
            runner: QueryRunner::new(engine, &config.run),
        }
    }

    /// Run all four scenarios against `dataset`.
    ///
    /// Always returns `Scenario::ALL.len() * BenchQuery::ALL.len()` records,
    /// in scenario then query order.
    pub async fn run_all(&self, dataset: &Dataset) -> Vec<TimingRecord> {
        // Each layout is materialized once and reused by both of its scenarios
        let mut views: BTreeMap<StorageLayout, Result<View, String>> = BTreeMap::new();
        let mut records = Vec::with_capacity(Scenario::ALL.len() * BenchQuery::ALL.len());

        for scenario in Scenario::ALL {
            let view = match views.entry(scenario.layout()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let materialized = self
                        .materializer
                        .materialize(dataset, scenario.layout())
                        .await
                        .map_err(|e| e.to_string());
                    entry.insert(materialized)
                }
            };

            match view {
                Ok(view) => records.extend(self.run_scenario(scenario, view).await),
                Err(reason) => {
                    warn!(scenario = %scenario, error = %reason, "Scenario skipped, materialization failed");
                    records.extend(failed_scenario(scenario, reason));
                }
            }
        }

        records
    }

    async fn run_scenario(&self, scenario: Scenario, view: &mut View) -> Vec<TimingRecord> {
        info!(scenario = %scenario, view = %view.name, "Benchmarking scenario");

        if let Err(e) = self.prepare_cache(view, scenario.cached()).await {
            warn!(scenario = %scenario, error = %e, "Scenario skipped, cache setup failed");
            return failed_scenario(scenario, &e.to_string());
        }

        let mut records = Vec::with_capacity(BenchQuery::ALL.len());
        for query in BenchQuery::ALL {
            let record = match self.runner.run(view, query).await {
                Ok(outcome) => {
                    info!(
                        scenario = %scenario,
                        query = %query,
                        elapsed_ms = outcome.elapsed.as_secs_f64() * 1000.0,
                        rows = outcome.row_count,
                        "Query timed"
                    );
                    TimingRecord::measured(
                        scenario,
                        query,
                        Measurement {
                            elapsed: outcome.elapsed,
                            row_count: outcome.row_count,
                            checksum: outcome.checksum,
                        },
                    )
                }
                Err(e) => {
                    warn!(scenario = %scenario, query = %query, error = %e, "Query failed");
                    TimingRecord::failed(scenario, query, e.to_string())
                }
            };
            records.push(record);
        }

        // Cache state belongs to the scenario, not the view
        if view.cached {
            if let Err(e) = self.cache.set_cache(view, false).await {
                warn!(scenario = %scenario, error = %e, "Failed to clear cache after scenario");
            }
        }

        records
    }

    /// Clear whatever cache state the view carries, then apply the scenario's.
    async fn prepare_cache(&self, view: &mut View, cached: bool) -> Result<(), HarnessError> {
        self.cache.set_cache(view, false).await?;
        if cached {
            self.cache.set_cache(view, true).await?;
        }
        Ok(())
    }
}

fn failed_scenario(scenario: Scenario, reason: &str) -> Vec<TimingRecord> {
    BenchQuery::ALL
        .iter()
        .map(|query| TimingRecord::failed(scenario, *query, reason))
        .collect()
}
