//! Shared fixtures for the harness integration tests.
//!
//! Generates a small deterministic home sales CSV whose aggregates can be
//! computed by hand.

#![allow(dead_code)]

use homebench::config::BenchConfig;
use homebench::datasets::{Dataset, DatasetResolver};
use homebench::engine::QueryEngine;
use homebench::queries::round2;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const ROWS: usize = 100;

pub const HEADER: &str =
    "id,date,date_built,price,bedrooms,bathrooms,sqft_living,sqft_lot,floors,waterfront,view";

/// One generated row, mirroring the CSV columns the queries touch.
#[derive(Debug, Clone)]
pub struct Sale {
    pub id: usize,
    pub sale_year: i64,
    pub date: String,
    pub date_built: Option<i64>,
    pub price: f64,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub sqft_living: i64,
    pub floors: i64,
    pub view: i64,
}

/// Every tenth row has no year built when `with_null_years` is set.
pub fn sales(with_null_years: bool) -> Vec<Sale> {
    (0..ROWS)
        .map(|i| {
            let sale_year = 2019 + (i % 3) as i64;
            Sale {
                id: i,
                sale_year,
                date: format!("{}-0{}-15", sale_year, 1 + i % 9),
                date_built: if with_null_years && i % 10 == 0 {
                    None
                } else {
                    Some(1990 + (i % 5) as i64)
                },
                price: (100_000 + 5_000 * i) as f64,
                bedrooms: 2 + (i % 4) as i64,
                bathrooms: 1 + (i % 3) as i64,
                sqft_living: 1500 + 10 * i as i64,
                floors: 1 + (i % 2) as i64,
                view: (i % 5) as i64,
            }
        })
        .collect()
}

pub fn write_sales_csv(path: &Path, rows: &[Sale]) {
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for row in rows {
        writeln!(
            file,
            "{},{},{},{},{},{},{},5000,{},0,{}",
            row.id,
            row.date,
            row.date_built.map(|y| y.to_string()).unwrap_or_default(),
            row.price,
            row.bedrooms,
            row.bathrooms,
            row.sqft_living,
            row.floors,
            row.view,
        )
        .unwrap();
    }
}

/// Write the fixture CSV under `dir` and return its path.
pub fn sales_csv(dir: &Path, with_null_years: bool) -> PathBuf {
    let path = dir.join("home_sales_revised.csv");
    write_sales_csv(&path, &sales(with_null_years));
    path
}

/// Config whose dataset and work dir both live under `dir`.
pub fn bench_config(dir: &Path, csv: &Path) -> BenchConfig {
    let mut config = BenchConfig::default();
    config.dataset.path = Some(csv.to_string_lossy().to_string());
    config.dataset.search_paths = Vec::new();
    config.dataset.download_dir = dir.join("downloads").to_string_lossy().to_string();
    config.dataset.download_url = "http://127.0.0.1:9/home_sales_revised.csv".to_string();
    config.paths.work_dir = dir.join("work").to_string_lossy().to_string();
    config.paths.report_path = dir
        .join("reports")
        .join("benchmarks.csv")
        .to_string_lossy()
        .to_string();
    config
}

pub async fn resolve(config: &BenchConfig, engine: Arc<dyn QueryEngine>) -> Dataset {
    DatasetResolver::new(config.dataset.clone(), engine)
        .resolve()
        .await
        .unwrap()
}

/// Hand-computed result of the four-bedroom by sale year query.
pub fn expected_4bed_by_year(rows: &[Sale]) -> Vec<(i64, f64)> {
    let mut groups: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.bedrooms == 4) {
        let entry = groups.entry(row.sale_year).or_insert((0.0, 0));
        entry.0 += row.price;
        entry.1 += 1;
    }
    groups
        .into_iter()
        .map(|(year, (sum, count))| (year, round2(sum / count as f64)))
        .collect()
}

/// Distinct year-built values, ascending, with the null bucket last.
pub fn expected_partition_keys(rows: &[Sale]) -> Vec<Option<i64>> {
    let mut keys: Vec<i64> = rows.iter().filter_map(|r| r.date_built).collect();
    keys.sort();
    keys.dedup();
    let mut keys: Vec<Option<i64>> = keys.into_iter().map(Some).collect();
    if rows.iter().any(|r| r.date_built.is_none()) {
        keys.push(None);
    }
    keys
}
