use anyhow::{Context, Result};
use clap::Parser;
use homebench::config::BenchConfig;
use homebench::datasets::DatasetResolver;
use homebench::engine::{DataFusionEngine, QueryEngine};
use homebench::report::{aggregate, render_comparison, ReportWriter};
use homebench::telemetry::init_telemetry;
use homebench::ScenarioMatrix;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(
    name = "home-sales-bench",
    about = "Benchmark home sales queries across storage layouts and cache states"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<String>,

    /// Override the report location from the config
    #[arg(long)]
    report: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let now = Instant::now();

    let telemetry = match init_telemetry() {
        Ok(telemetry) => Some(telemetry),
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            None
        }
    };

    let result = run(Cli::parse()).await;

    tracing::info!("Benchmark finished in {}ms", now.elapsed().as_millis());
    if let Some(telemetry) = telemetry {
        telemetry.shutdown();
    }

    result
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = BenchConfig::load(cli.config.as_deref())?;
    if let Some(report) = cli.report {
        config.paths.report_path = report;
    }
    config.validate()?;

    tracing::info!("Configuration loaded");

    let engine: Arc<dyn QueryEngine> = Arc::new(DataFusionEngine::from_config(&config.engine));

    // Without a dataset there is nothing to benchmark
    let dataset = DatasetResolver::new(config.dataset.clone(), engine.clone())
        .resolve()
        .await
        .context("Failed to resolve home sales dataset")?;

    tracing::info!(
        "Dataset {} resolved with {} rows",
        dataset.path().display(),
        dataset.row_count()
    );

    let matrix = ScenarioMatrix::new(engine, &config);
    let records = matrix.run_all(&dataset).await;

    let failed = records.iter().filter(|r| r.is_failed()).count();
    if failed > 0 {
        tracing::warn!("{} of {} measurements failed", failed, records.len());
    }

    let location = ReportWriter::new(config.report_path())
        .write(&records)
        .context("Failed to write benchmark report")?;

    println!("{}", render_comparison(&aggregate(&records)));
    println!("Report written to {}", location.report.display());
    println!("Raw timings written to {}", location.records.display());

    Ok(())
}
