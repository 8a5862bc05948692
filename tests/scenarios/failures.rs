//! Test: Failures - cache and server errors, validation errors, aborts

use crate::helpers::*;
use pipeline_studio::api::{ApiError, SchemaError};
use pipeline_studio::core::{StoreFailure, StoreStatus};
use pipeline_studio::persistence::{CacheError, InMemoryCache, LocalCache};
use pipeline_studio::studio::{FetchOptions, PipelineStore, SaveResult, StudioError};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_unavailable_cache_is_a_db_error() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    cache.set_unavailable(true);

    let store = PipelineStore::new(api.clone(), cache.clone(), scope("p1"));
    let err = store.initialize().await.unwrap_err();

    assert!(matches!(err, StudioError::Cache(CacheError::InitFailed { attempts: 5, .. })));
    assert!(matches!(store.state().await.status, StoreStatus::Error(StoreFailure::Db(_))));
}

#[tokio::test]
async fn test_cache_failing_during_fetch_is_a_db_error() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    api.put_pipeline(&scope("p1"), &sample_pipeline("p1"));

    let store = new_store(&api, &cache, scope("p1")).await;
    cache.set_unavailable(true);

    assert!(store.fetch(FetchOptions::default()).await.is_err());
    assert!(matches!(store.state().await.status, StoreStatus::Error(StoreFailure::Db(_))));
    assert_eq!(api.get_calls(), 0);
}

#[tokio::test]
async fn test_server_failure_without_cached_copy() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    api.set_fail_reads(true);

    let store = new_store(&api, &cache, scope("p1")).await;
    let err = store.fetch(FetchOptions::default()).await.unwrap_err();

    assert!(matches!(err, StudioError::Api(ApiError::Api { status: 503, .. })));
    let state = store.state().await;
    assert!(matches!(state.status, StoreStatus::Error(StoreFailure::Fetch(_))));
    assert!(!state.is_initialized);
}

#[tokio::test]
async fn test_server_failure_keeps_cached_copy() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    let working = pipeline_with("p1", "offline edits", Vec::new());
    let original = pipeline_with("p1", "server", Vec::new());
    seed_cache(&cache, &scope("p1"), &working, &original).await;
    api.set_fail_reads(true);

    let store = new_store(&api, &cache, scope("p1")).await;
    store.fetch(FetchOptions::forced()).await.unwrap();

    let state = store.state().await;
    assert_eq!(state.status, StoreStatus::Ready);
    assert_eq!(state.pipeline.name, "offline edits");
    assert!(state.is_updated);
    assert!(state.fetch_error.as_deref().is_some_and(|e| e.contains("service unavailable")));

    // Still cached
    assert!(cache.get(&scope("p1")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unknown_pipeline_is_not_found() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());

    let store = new_store(&api, &cache, scope("missing")).await;
    let err = store.fetch(FetchOptions::default()).await.unwrap_err();

    assert!(matches!(err, StudioError::NotFound(ref id) if id == "missing"));
    assert!(store.state().await.status.is_error());
}

#[tokio::test]
async fn test_schema_errors_leave_state_untouched() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    api.put_pipeline(&scope("p1"), &sample_pipeline("p1"));

    let store = loaded_store(&api, &cache, scope("p1")).await;
    store.remove_stage("B", false).await.unwrap();
    let before = store.state().await;

    let errors = vec![SchemaError {
        fqn: "$.pipeline.stages[0].stage.spec.execution".to_string(),
        message: "execution is required".to_string(),
        stage_identifier: Some("A".to_string()),
        step_identifier: None,
    }];
    api.reject_saves_with(errors.clone());

    let result = store.save().await.unwrap();
    assert_eq!(result, SaveResult::Invalid(errors));
    assert_eq!(store.state().await, before);
    assert!(cache.get(&scope("p1")).await.unwrap().is_some());
    assert_eq!(api.save_calls(), 1);
}

#[tokio::test]
async fn test_cache_write_failure_is_reported_but_applied() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    api.put_pipeline(&scope("p1"), &sample_pipeline("p1"));

    let store = loaded_store(&api, &cache, scope("p1")).await;
    cache.set_unavailable(true);

    let err = store.remove_stage("A", false).await.unwrap_err();
    assert!(matches!(err, StudioError::Cache(CacheError::Backend(_))));

    let state = store.state().await;
    assert_eq!(layout(&state.pipeline), "B [C D]");
    assert_eq!(state.status, StoreStatus::Ready);
}

#[tokio::test]
async fn test_abort_cancels_in_flight_fetch() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    api.put_pipeline(&scope("p1"), &sample_pipeline("p1"));
    api.set_read_delay(Duration::from_secs(30));

    let store = new_store(&api, &cache, scope("p1")).await;

    let (result, _) = tokio::join!(store.fetch(FetchOptions::default()), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.abort();
    });

    assert!(matches!(result, Err(StudioError::Api(ApiError::Aborted))));
    let state = store.state().await;
    assert_eq!(state.status, StoreStatus::Uninitialized);
    assert!(!state.is_initialized);
    assert!(cache.get(&scope("p1")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_edits_before_load_are_rejected() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    let store = new_store(&api, &cache, scope("p1")).await;

    assert!(matches!(store.remove_stage("A", false).await, Err(StudioError::NotReady)));
    assert!(matches!(store.save().await, Err(StudioError::NotReady)));
}
