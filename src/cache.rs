//! In-memory caching of views, verified against the engine.

use std::sync::Arc;
use tracing::info;

use crate::engine::QueryEngine;
use crate::storage::View;
use crate::HarnessError;

/// Toggles engine-side caching of a view.
///
/// Enabling is eager: the whole view is loaded before `set_cache` returns, so
/// the first timed query of a cached scenario never pays the population cost.
#[derive(Debug)]
pub struct CacheController {
    engine: Arc<dyn QueryEngine>,
}

impl CacheController {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self { engine }
    }

    /// Request a cache state for `view` and confirm the engine reports it.
    #[tracing::instrument(name = "set_cache", skip(self, view), fields(view = %view.name))]
    pub async fn set_cache(&self, view: &mut View, enabled: bool) -> Result<(), HarnessError> {
        if enabled {
            let loaded = self.engine.cache_table(&view.name).await.map_err(|e| {
                HarnessError::Materialization(format!(
                    "Forcing pass over {} failed: {:#}",
                    view.name, e
                ))
            })?;
            if loaded != view.row_count {
                return Err(HarnessError::Materialization(format!(
                    "Forcing pass over {} loaded {} rows, expected {}",
                    view.name, loaded, view.row_count
                )));
            }
        } else {
            self.engine.uncache_table(&view.name).await.map_err(|e| {
                HarnessError::Materialization(format!(
                    "Failed to clear cache for {}: {:#}",
                    view.name, e
                ))
            })?;
        }

        let actual = self.is_cached(view).await?;
        view.cached = actual;
        if actual != enabled {
            return Err(HarnessError::CacheVerification {
                view: view.name.clone(),
                requested: enabled,
                actual,
            });
        }

        info!(cached = actual, "Cache state verified");
        Ok(())
    }

    /// Engine-reported cache state of `view`.
    pub async fn is_cached(&self, view: &View) -> Result<bool, HarnessError> {
        self.engine.is_cached(&view.name).await.map_err(|e| {
            HarnessError::Materialization(format!(
                "Failed to read cache state of {}: {:#}",
                view.name, e
            ))
        })
    }
}
