pub mod cache;
pub mod config;
pub mod datasets;
pub mod engine;
mod error;
pub mod queries;
pub mod report;
pub mod scenario;
pub mod storage;
pub mod telemetry;

pub use error::HarnessError;
pub use scenario::{Scenario, ScenarioMatrix, TimingRecord};
