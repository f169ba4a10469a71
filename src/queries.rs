//! The fixed benchmark query set and the runner that times it.

use datafusion::arrow::array::{Array, AsArray};
use datafusion::arrow::datatypes::Float64Type;
use datafusion::arrow::record_batch::RecordBatch;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::RunConfig;
use crate::engine::QueryEngine;
use crate::storage::View;
use crate::HarnessError;

/// Name of the aggregate column every benchmark query produces.
pub const AVG_PRICE_COLUMN: &str = "avg_price";

/// The four home sales aggregations, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BenchQuery {
    /// Average price per sale year for four-bedroom homes.
    AvgPrice4BedByYear,
    /// Average price per year built for three-bedroom, three-bathroom homes.
    AvgPrice3Bed3BathByYear,
    /// As above, restricted to two floors and at least 2000 sqft of living space.
    AvgPriceLuxuryHomes,
    /// Average price per view rating for homes priced at 350000 or more.
    AvgPriceByViewRating,
}

impl BenchQuery {
    /// Every query, in the order each scenario runs them.
    pub const ALL: [BenchQuery; 4] = [
        BenchQuery::AvgPrice4BedByYear,
        BenchQuery::AvgPrice3Bed3BathByYear,
        BenchQuery::AvgPriceLuxuryHomes,
        BenchQuery::AvgPriceByViewRating,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            BenchQuery::AvgPrice4BedByYear => "avg_price_4bed_by_year",
            BenchQuery::AvgPrice3Bed3BathByYear => "avg_price_3bed_3bath_by_year",
            BenchQuery::AvgPriceLuxuryHomes => "avg_price_luxury_homes",
            BenchQuery::AvgPriceByViewRating => "avg_price_by_view_rating",
        }
    }

    /// Name of the grouping column in the result.
    pub fn group_column(&self) -> &'static str {
        match self {
            BenchQuery::AvgPrice4BedByYear => "sale_year",
            BenchQuery::AvgPrice3Bed3BathByYear | BenchQuery::AvgPriceLuxuryHomes => "date_built",
            BenchQuery::AvgPriceByViewRating => "view",
        }
    }

    fn group_expr(&self) -> &'static str {
        match self {
            BenchQuery::AvgPrice4BedByYear => "CAST(date_part('year', \"date\") AS BIGINT)",
            BenchQuery::AvgPrice3Bed3BathByYear | BenchQuery::AvgPriceLuxuryHomes => {
                "\"date_built\""
            }
            BenchQuery::AvgPriceByViewRating => "\"view\"",
        }
    }

    fn predicate(&self) -> &'static str {
        match self {
            BenchQuery::AvgPrice4BedByYear => "\"bedrooms\" = 4",
            BenchQuery::AvgPrice3Bed3BathByYear => "\"bedrooms\" = 3 AND \"bathrooms\" = 3",
            BenchQuery::AvgPriceLuxuryHomes => {
                "\"bedrooms\" = 3 AND \"bathrooms\" = 3 AND \"floors\" = 2 AND \"sqft_living\" >= 2000"
            }
            BenchQuery::AvgPriceByViewRating => "\"price\" >= 350000",
        }
    }

    /// SQL for this query against the named view.
    ///
    /// Output is `(<group column>, avg_price)` ordered by the group key
    /// ascending with nulls last, so row order is identical on every layout.
    pub fn sql(&self, view: &str) -> String {
        format!(
            "SELECT {expr} AS \"{group}\", ROUND(AVG(\"price\"), 2) AS {avg} \
             FROM \"{view}\" \
             WHERE {predicate} \
             GROUP BY {expr} \
             ORDER BY \"{group}\" ASC NULLS LAST",
            expr = self.group_expr(),
            group = self.group_column(),
            avg = AVG_PRICE_COLUMN,
            view = view,
            predicate = self.predicate(),
        )
    }
}

impl fmt::Display for BenchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Result of one timed query.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub query: BenchQuery,
    pub batches: Vec<RecordBatch>,
    /// Mean over the timed iterations.
    pub elapsed: Duration,
    pub row_count: usize,
    /// Sum of the `avg_price` column, rounded to 2 decimals.
    pub checksum: f64,
}

/// Runs benchmark queries against a view and times them.
#[derive(Debug)]
pub struct QueryRunner {
    engine: Arc<dyn QueryEngine>,
    warmup_runs: u32,
    iterations: u32,
}

impl QueryRunner {
    pub fn new(engine: Arc<dyn QueryEngine>, config: &RunConfig) -> Self {
        Self {
            engine,
            warmup_runs: config.warmup_runs,
            iterations: config.iterations.max(1),
        }
    }

    /// Execute `query` against `view`.
    ///
    /// The timer covers execution plus full collection of the result and
    /// nothing else. Warm-up runs are executed first and not timed.
    #[tracing::instrument(
        name = "run_query",
        skip(self, view),
        fields(view = %view.name, query = %query)
    )]
    pub async fn run(&self, view: &View, query: BenchQuery) -> Result<QueryOutcome, HarnessError> {
        let sql = query.sql(&view.name);

        for _ in 0..self.warmup_runs {
            self.execute(&sql).await?;
        }

        let mut total = Duration::ZERO;
        let mut batches = Vec::new();
        for _ in 0..self.iterations {
            let start = Instant::now();
            batches = self.execute(&sql).await?;
            total += start.elapsed();
        }
        let elapsed = total / self.iterations;

        let row_count = batches.iter().map(|b| b.num_rows()).sum();
        let checksum = checksum(&batches)?;

        debug!(
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            rows = row_count,
            checksum,
            "Query finished"
        );

        Ok(QueryOutcome {
            query,
            batches,
            elapsed,
            row_count,
            checksum,
        })
    }

    async fn execute(&self, sql: &str) -> Result<Vec<RecordBatch>, HarnessError> {
        self.engine
            .execute(sql)
            .await
            .map_err(|e| HarnessError::QueryExecution(format!("{:#}", e)))
    }
}

/// Round to 2 decimal places the way the engine's ROUND does.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Sum of the non-null `avg_price` values across `batches`.
pub fn checksum(batches: &[RecordBatch]) -> Result<f64, HarnessError> {
    let mut sum = 0.0;
    for batch in batches {
        let column = batch.column_by_name(AVG_PRICE_COLUMN).ok_or_else(|| {
            HarnessError::QueryExecution(format!("result has no {} column", AVG_PRICE_COLUMN))
        })?;
        let values = column.as_primitive_opt::<Float64Type>().ok_or_else(|| {
            HarnessError::QueryExecution(format!("{} is not DOUBLE", AVG_PRICE_COLUMN))
        })?;
        for i in 0..values.len() {
            if values.is_valid(i) {
                sum += values.value(i);
            }
        }
    }
    Ok(round2(sum))
}
