//! Aggregation of timing records into the durable benchmark report.

use datafusion::arrow::array::{ArrayRef, StringArray};
use datafusion::arrow::csv::WriterBuilder;
use datafusion::arrow::datatypes::{DataType, Field, Schema};
use datafusion::arrow::record_batch::RecordBatch;
use std::fmt::Write as _;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::queries::BenchQuery;
use crate::scenario::{RecordStatus, Scenario, TimingRecord};
use crate::HarnessError;

/// Cell value for a measurement that does not exist because something failed.
pub const FAILED_SENTINEL: &str = "FAILED";

/// Cell value for a speedup that cannot be computed because the baseline failed.
pub const NOT_AVAILABLE: &str = "N/A";

const RECORDS_FILE_NAME: &str = "benchmark_records.csv";

/// Aggregated timings of one scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSummary {
    pub scenario: Scenario,
    /// Mean elapsed time per query in `BenchQuery::ALL` order; `None` if failed.
    pub query_means: Vec<(BenchQuery, Option<Duration>)>,
    /// Mean of the query means; `None` unless every query succeeded.
    pub overall_mean: Option<Duration>,
    /// Baseline overall mean divided by this scenario's overall mean.
    pub speedup: Option<f64>,
    pub failures: usize,
}

impl ScenarioSummary {
    pub fn query_mean(&self, query: BenchQuery) -> Option<Duration> {
        self.query_means
            .iter()
            .find(|(q, _)| *q == query)
            .and_then(|(_, mean)| *mean)
    }

    pub fn is_failed(&self) -> bool {
        self.overall_mean.is_none()
    }
}

fn mean(durations: &[Duration]) -> Option<Duration> {
    if durations.is_empty() {
        return None;
    }
    let total: Duration = durations.iter().sum();
    Some(total / durations.len() as u32)
}

/// Group records by scenario in `Scenario::ALL` order and compute means and
/// speedups against `Scenario::BASELINE`.
pub fn aggregate(records: &[TimingRecord]) -> Vec<ScenarioSummary> {
    let mut summaries: Vec<ScenarioSummary> = Scenario::ALL
        .iter()
        .map(|scenario| {
            let scenario_records: Vec<&TimingRecord> =
                records.iter().filter(|r| r.scenario == *scenario).collect();
            let failures = scenario_records.iter().filter(|r| r.is_failed()).count();

            let query_means: Vec<(BenchQuery, Option<Duration>)> = BenchQuery::ALL
                .iter()
                .map(|query| {
                    let matching: Vec<&&TimingRecord> = scenario_records
                        .iter()
                        .filter(|r| r.query == *query)
                        .collect();
                    // A single failed observation invalidates the pair
                    let elapsed: Option<Vec<Duration>> =
                        matching.iter().map(|r| r.elapsed()).collect();
                    (*query, elapsed.and_then(|e| mean(&e)))
                })
                .collect();

            let overall_mean = query_means
                .iter()
                .map(|(_, m)| *m)
                .collect::<Option<Vec<Duration>>>()
                .and_then(|means| mean(&means));

            ScenarioSummary {
                scenario: *scenario,
                query_means,
                overall_mean,
                speedup: None,
                failures,
            }
        })
        .collect();

    let baseline = summaries
        .iter()
        .find(|s| s.scenario == Scenario::BASELINE)
        .and_then(|s| s.overall_mean);

    for summary in &mut summaries {
        summary.speedup = match (baseline, summary.overall_mean) {
            (Some(_), Some(_)) if summary.scenario == Scenario::BASELINE => Some(1.0),
            (Some(base), Some(own)) => ratio(base, own),
            _ => None,
        };
    }

    summaries
}

/// Where a report run put its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLocation {
    /// One row per scenario.
    pub report: PathBuf,
    /// One row per timing record.
    pub records: PathBuf,
}

/// Writes the aggregated report to a fixed location, replacing any previous one.
#[derive(Debug)]
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn records_path(&self) -> PathBuf {
        self.path
            .parent()
            .map(|dir| dir.join(RECORDS_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(RECORDS_FILE_NAME))
    }

    #[tracing::instrument(name = "write_report", skip(self, records), fields(path = %self.path.display()))]
    pub fn write(&self, records: &[TimingRecord]) -> Result<ReportLocation, HarnessError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    HarnessError::Report(format!(
                        "Failed to create report directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let summaries = aggregate(records);
        write_csv(&self.path, &summary_batch(&summaries)?)?;

        let records_path = self.records_path();
        write_csv(&records_path, &records_batch(records)?)?;

        info!(
            report = %self.path.display(),
            records = %records_path.display(),
            scenarios = summaries.len(),
            "Benchmark report written"
        );

        Ok(ReportLocation {
            report: self.path.clone(),
            records: records_path,
        })
    }
}

fn format_secs(duration: Option<Duration>) -> String {
    match duration {
        Some(d) => format!("{:.6}", d.as_secs_f64()),
        None => FAILED_SENTINEL.to_string(),
    }
}

/// `FAILED` only when the scenario itself has no overall mean; a missing
/// ratio for a measured scenario (failed baseline, zero elapsed time) is `N/A`.
fn speedup_cell(summary: &ScenarioSummary, render: impl Fn(f64) -> String) -> String {
    match summary.speedup {
        Some(ratio) => render(ratio),
        None if summary.is_failed() => FAILED_SENTINEL.to_string(),
        None => NOT_AVAILABLE.to_string(),
    }
}

fn utf8_batch(columns: Vec<(String, Vec<String>)>) -> Result<RecordBatch, HarnessError> {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, _)| Field::new(name, DataType::Utf8, false))
        .collect();
    let arrays: Vec<ArrayRef> = columns
        .into_iter()
        .map(|(_, values)| Arc::new(StringArray::from(values)) as ArrayRef)
        .collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|e| HarnessError::Report(e.to_string()))
}

fn summary_batch(summaries: &[ScenarioSummary]) -> Result<RecordBatch, HarnessError> {
    let mut columns = vec![(
        "scenario".to_string(),
        summaries.iter().map(|s| s.scenario.id().to_string()).collect(),
    )];
    for query in BenchQuery::ALL {
        columns.push((
            format!("{}_secs", query.id()),
            summaries
                .iter()
                .map(|s| format_secs(s.query_mean(query)))
                .collect(),
        ));
    }
    columns.push((
        "overall_mean_secs".to_string(),
        summaries.iter().map(|s| format_secs(s.overall_mean)).collect(),
    ));
    columns.push((
        "speedup_vs_baseline".to_string(),
        summaries
            .iter()
            .map(|s| speedup_cell(s, |r| format!("{:.3}", r)))
            .collect(),
    ));

    utf8_batch(columns)
}

fn records_batch(records: &[TimingRecord]) -> Result<RecordBatch, HarnessError> {
    let mut scenario = Vec::with_capacity(records.len());
    let mut query = Vec::with_capacity(records.len());
    let mut status = Vec::with_capacity(records.len());
    let mut elapsed = Vec::with_capacity(records.len());
    let mut rows = Vec::with_capacity(records.len());
    let mut checksum = Vec::with_capacity(records.len());
    let mut error = Vec::with_capacity(records.len());

    for record in records {
        scenario.push(record.scenario.id().to_string());
        query.push(record.query.id().to_string());
        match &record.status {
            RecordStatus::Measured(m) => {
                status.push("ok".to_string());
                elapsed.push(format_secs(Some(m.elapsed)));
                rows.push(m.row_count.to_string());
                checksum.push(format!("{:.2}", m.checksum));
                error.push(String::new());
            }
            RecordStatus::Failed { reason } => {
                status.push("failed".to_string());
                elapsed.push(FAILED_SENTINEL.to_string());
                rows.push(FAILED_SENTINEL.to_string());
                checksum.push(FAILED_SENTINEL.to_string());
                error.push(reason.clone());
            }
        }
    }

    utf8_batch(vec![
        ("scenario".to_string(), scenario),
        ("query".to_string(), query),
        ("status".to_string(), status),
        ("elapsed_secs".to_string(), elapsed),
        ("row_count".to_string(), rows),
        ("checksum".to_string(), checksum),
        ("error".to_string(), error),
    ])
}

/// Truncates any existing file.
fn write_csv(path: &Path, batch: &RecordBatch) -> Result<(), HarnessError> {
    let file = File::create(path).map_err(|e| {
        HarnessError::Report(format!("Failed to create {}: {}", path.display(), e))
    })?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer
        .write(batch)
        .map_err(|e| HarnessError::Report(format!("Failed to write {}: {}", path.display(), e)))
}

fn cell(duration: Option<Duration>) -> String {
    match duration {
        Some(d) => format!("{:.3}", d.as_secs_f64()),
        None => FAILED_SENTINEL.to_string(),
    }
}

fn ratio(base: Duration, other: Duration) -> Option<f64> {
    (!other.is_zero()).then(|| base.as_secs_f64() / other.as_secs_f64())
}

/// Human-readable comparison of the scenarios: per-query seconds, totals and
/// the headline speedups. Advisory output only.
pub fn render_comparison(summaries: &[ScenarioSummary]) -> String {
    let mut out = String::new();
    let width = 30 + 18 * summaries.len();

    let _ = writeln!(out, "PERFORMANCE COMPARISON (seconds)");
    let _ = writeln!(out, "{}", "=".repeat(width));
    let _ = write!(out, "{:<30}", "Query");
    for summary in summaries {
        let _ = write!(out, "{:>18}", summary.scenario.id());
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "-".repeat(width));

    for query in BenchQuery::ALL {
        let _ = write!(out, "{:<30}", query.id());
        for summary in summaries {
            let _ = write!(out, "{:>18}", cell(summary.query_mean(query)));
        }
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "{}", "-".repeat(width));

    let _ = write!(out, "{:<30}", "TOTAL");
    for summary in summaries {
        let total = summary.overall_mean.map(|m| m * BenchQuery::ALL.len() as u32);
        let _ = write!(out, "{:>18}", cell(total));
    }
    let _ = writeln!(out);
    let _ = write!(out, "{:<30}", "SPEEDUP vs baseline");
    for summary in summaries {
        let speedup = speedup_cell(summary, |r| format!("{:.2}x", r));
        let _ = write!(out, "{:>18}", speedup);
    }
    let _ = writeln!(out);

    let overall = |scenario: Scenario| {
        summaries
            .iter()
            .find(|s| s.scenario == scenario)
            .and_then(|s| s.overall_mean)
    };
    let baseline = overall(Scenario::BASELINE);
    let insights = [
        ("CSV caching speedup", Scenario::CsvCached),
        ("Parquet format speedup", Scenario::ParquetUncached),
        ("Best case (Parquet + cache)", Scenario::ParquetCached),
    ];

    let _ = writeln!(out);
    let _ = writeln!(out, "INSIGHTS:");
    for (label, scenario) in insights {
        let _ = match (baseline, overall(scenario)) {
            (None, _) => writeln!(
                out,
                "  {}: unavailable ({} failed)",
                label,
                Scenario::BASELINE
            ),
            (_, None) => writeln!(out, "  {}: unavailable ({} failed)", label, scenario),
            (Some(base), Some(own)) => match ratio(base, own) {
                Some(r) => writeln!(out, "  {}: {:.1}x vs {}", label, r, Scenario::BASELINE),
                None => writeln!(out, "  {}: unavailable (zero elapsed time)", label),
            },
        };
    }

    let failed: Vec<String> = summaries
        .iter()
        .filter(|s| s.failures > 0)
        .map(|s| format!("{} ({} failed)", s.scenario, s.failures))
        .collect();
    if !failed.is_empty() {
        let _ = writeln!(out, "  Failures: {}", failed.join(", "));
    }

    out
}
