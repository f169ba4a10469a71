//! Cache toggling and verification against the engine.

mod common;

use common::{bench_config, resolve, sales_csv, ROWS};
use homebench::cache::CacheController;
use homebench::engine::{DataFusionEngine, MockEngine, QueryEngine};
use homebench::storage::{StorageLayout, StorageMaterializer, View};
use homebench::HarnessError;
use std::sync::Arc;

async fn view_with(engine: Arc<dyn QueryEngine>, layout: StorageLayout) -> (tempfile::TempDir, View) {
    let dir = tempfile::tempdir().unwrap();
    let csv = sales_csv(dir.path(), true);
    let config = bench_config(dir.path(), &csv);
    let dataset = resolve(&config, engine.clone()).await;
    let view = StorageMaterializer::new(engine, config.work_dir(), config.parquet.clone())
        .materialize(&dataset, layout)
        .await
        .unwrap();
    (dir, view)
}

#[tokio::test]
async fn test_cache_toggle_is_reported_by_engine() {
    for layout in [StorageLayout::Row, StorageLayout::Columnar] {
        let engine: Arc<dyn QueryEngine> = Arc::new(DataFusionEngine::new());
        let (_dir, mut view) = view_with(engine.clone(), layout).await;
        let cache = CacheController::new(engine.clone());

        assert!(!cache.is_cached(&view).await.unwrap());

        cache.set_cache(&mut view, true).await.unwrap();
        assert!(view.cached);
        assert!(cache.is_cached(&view).await.unwrap());

        cache.set_cache(&mut view, false).await.unwrap();
        assert!(!view.cached);
        assert!(!cache.is_cached(&view).await.unwrap());
    }
}

#[tokio::test]
async fn test_cache_is_idempotent() {
    let engine: Arc<dyn QueryEngine> = Arc::new(DataFusionEngine::new());
    let (_dir, mut view) = view_with(engine.clone(), StorageLayout::Row).await;
    let cache = CacheController::new(engine);

    cache.set_cache(&mut view, true).await.unwrap();
    cache.set_cache(&mut view, true).await.unwrap();
    assert!(cache.is_cached(&view).await.unwrap());

    cache.set_cache(&mut view, false).await.unwrap();
    cache.set_cache(&mut view, false).await.unwrap();
    assert!(!cache.is_cached(&view).await.unwrap());
}

#[tokio::test]
async fn test_cached_view_is_served_from_memory() {
    let engine: Arc<dyn QueryEngine> = Arc::new(DataFusionEngine::new());
    let (_dir, mut view) = view_with(engine.clone(), StorageLayout::Columnar).await;
    let cache = CacheController::new(engine.clone());

    cache.set_cache(&mut view, true).await.unwrap();
    std::fs::remove_dir_all(&view.location).unwrap();

    let batches = engine
        .execute("SELECT COUNT(*) FROM home_sales_parquet")
        .await
        .unwrap();
    assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 1);
}

#[tokio::test]
async fn test_forcing_pass_row_mismatch_fails() {
    let engine: Arc<dyn QueryEngine> = Arc::new(DataFusionEngine::new());
    let (_dir, mut view) = view_with(engine.clone(), StorageLayout::Row).await;
    view.row_count = ROWS + 1;

    let err = CacheController::new(engine)
        .set_cache(&mut view, true)
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::Materialization(_)));
}

#[tokio::test]
async fn test_ignored_cache_request_fails_verification() {
    let mock = Arc::new(MockEngine::new());
    mock.set_ignore_cache_requests(true);
    let engine: Arc<dyn QueryEngine> = mock.clone();
    let (_dir, mut view) = view_with(engine.clone(), StorageLayout::Row).await;

    let err = CacheController::new(engine)
        .set_cache(&mut view, true)
        .await
        .unwrap_err();

    match err {
        HarnessError::CacheVerification {
            view: name,
            requested,
            actual,
        } => {
            assert_eq!(name, "home_sales_csv");
            assert!(requested);
            assert!(!actual);
        }
        other => panic!("expected CacheVerification, got {:?}", other),
    }
    assert!(!view.cached);
    assert_eq!(mock.cache_calls(), 1);
}
