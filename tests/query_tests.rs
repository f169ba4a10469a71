//! Benchmark query results across every layout and cache state.

mod common;

use common::{bench_config, expected_4bed_by_year, resolve, sales, sales_csv};
use datafusion::arrow::array::{Array, AsArray};
use datafusion::arrow::datatypes::{Float64Type, Int64Type};
use datafusion::arrow::record_batch::RecordBatch;
use homebench::cache::CacheController;
use homebench::config::RunConfig;
use homebench::engine::{DataFusionEngine, QueryEngine};
use homebench::queries::{BenchQuery, QueryOutcome, QueryRunner, AVG_PRICE_COLUMN};
use homebench::scenario::Scenario;
use homebench::storage::StorageMaterializer;
use std::collections::BTreeMap;
use std::sync::Arc;

/// `(group, avg_price)` pairs of a query result, in result order.
fn rows(batches: &[RecordBatch], group_column: &str) -> Vec<(Option<i64>, Option<f64>)> {
    let mut out = Vec::new();
    for batch in batches {
        let groups = batch
            .column_by_name(group_column)
            .unwrap()
            .as_primitive::<Int64Type>();
        let prices = batch
            .column_by_name(AVG_PRICE_COLUMN)
            .unwrap()
            .as_primitive::<Float64Type>();
        for i in 0..batch.num_rows() {
            out.push((
                groups.is_valid(i).then(|| groups.value(i)),
                prices.is_valid(i).then(|| prices.value(i)),
            ));
        }
    }
    out
}

/// Run every query in every scenario against fresh views of the fixture.
async fn run_matrix(with_null_years: bool) -> BTreeMap<(Scenario, BenchQuery), QueryOutcome> {
    let dir = tempfile::tempdir().unwrap();
    let csv = sales_csv(dir.path(), with_null_years);
    let config = bench_config(dir.path(), &csv);
    let engine: Arc<dyn QueryEngine> = Arc::new(DataFusionEngine::new());
    let dataset = resolve(&config, engine.clone()).await;

    let materializer =
        StorageMaterializer::new(engine.clone(), config.work_dir(), config.parquet.clone());
    let cache = CacheController::new(engine.clone());
    let runner = QueryRunner::new(engine, &config.run);

    let mut outcomes = BTreeMap::new();
    for scenario in Scenario::ALL {
        let mut view = materializer
            .materialize(&dataset, scenario.layout())
            .await
            .unwrap();
        cache.set_cache(&mut view, scenario.cached()).await.unwrap();
        for query in BenchQuery::ALL {
            let outcome = runner.run(&view, query).await.unwrap();
            outcomes.insert((scenario, query), outcome);
        }
    }
    outcomes
}

#[tokio::test]
async fn test_four_bed_by_year_matches_hand_computed() {
    let outcomes = run_matrix(false).await;
    let expected: Vec<(Option<i64>, Option<f64>)> = expected_4bed_by_year(&sales(false))
        .into_iter()
        .map(|(year, avg)| (Some(year), Some(avg)))
        .collect();
    assert_eq!(expected.len(), 3);

    for scenario in Scenario::ALL {
        let outcome = &outcomes[&(scenario, BenchQuery::AvgPrice4BedByYear)];
        assert_eq!(
            rows(&outcome.batches, "sale_year"),
            expected,
            "scenario {}",
            scenario
        );
    }
}

#[tokio::test]
async fn test_results_identical_across_scenarios() {
    let outcomes = run_matrix(true).await;

    for query in BenchQuery::ALL {
        let baseline = &outcomes[&(Scenario::BASELINE, query)];
        let baseline_rows = rows(&baseline.batches, query.group_column());
        assert!(!baseline_rows.is_empty(), "{} returned nothing", query);

        for scenario in Scenario::ALL {
            let outcome = &outcomes[&(scenario, query)];
            assert_eq!(outcome.row_count, baseline.row_count, "{} {}", scenario, query);
            assert_eq!(outcome.checksum, baseline.checksum, "{} {}", scenario, query);
            assert_eq!(
                rows(&outcome.batches, query.group_column()),
                baseline_rows,
                "{} {}",
                scenario,
                query
            );
        }
    }
}

#[tokio::test]
async fn test_groups_are_ordered_with_nulls_last() {
    let outcomes = run_matrix(true).await;

    let outcome = &outcomes[&(Scenario::ParquetUncached, BenchQuery::AvgPrice3Bed3BathByYear)];
    let groups: Vec<Option<i64>> = rows(&outcome.batches, "date_built")
        .into_iter()
        .map(|(group, _)| group)
        .collect();

    let non_null: Vec<i64> = groups.iter().flatten().copied().collect();
    let mut sorted = non_null.clone();
    sorted.sort();
    assert_eq!(non_null, sorted);
    if let Some(position) = groups.iter().position(|g| g.is_none()) {
        assert_eq!(position, groups.len() - 1);
    }
}

#[tokio::test]
async fn test_repeated_runs_are_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let csv = sales_csv(dir.path(), true);
    let config = bench_config(dir.path(), &csv);
    let engine: Arc<dyn QueryEngine> = Arc::new(DataFusionEngine::new());
    let dataset = resolve(&config, engine.clone()).await;
    let view = StorageMaterializer::new(engine.clone(), config.work_dir(), config.parquet.clone())
        .materialize(&dataset, Scenario::BASELINE.layout())
        .await
        .unwrap();

    let runner = QueryRunner::new(
        engine,
        &RunConfig {
            warmup_runs: 1,
            iterations: 3,
        },
    );
    for query in BenchQuery::ALL {
        let first = runner.run(&view, query).await.unwrap();
        let second = runner.run(&view, query).await.unwrap();
        assert_eq!(first.checksum, second.checksum);
        assert_eq!(
            rows(&first.batches, query.group_column()),
            rows(&second.batches, query.group_column())
        );
    }
}
