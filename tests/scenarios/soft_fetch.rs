//! Test: Soft Fetch - two sessions sharing one local cache

use crate::helpers::*;
use pipeline_studio::core::{DrawerType, PipelineViewState, SelectionState};
use pipeline_studio::persistence::{InMemoryCache, LocalCache};
use pipeline_studio::studio::FetchOptions;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_soft_fetch_adopts_other_session_edits() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    api.put_pipeline(&scope("p1"), &sample_pipeline("p1"));

    let first = loaded_store(&api, &cache, scope("p1")).await;
    let second = loaded_store(&api, &cache, scope("p1")).await;

    second
        .update_pipeline_view(PipelineViewState {
            drawer: DrawerType::StageConfig,
            is_split_view_open: true,
            selection: SelectionState::stage("C"),
        })
        .await
        .unwrap();

    // Nothing changed yet
    assert!(!second.soft_fetch().await.unwrap());

    first.remove_stage("C", false).await.unwrap();

    assert!(second.soft_fetch().await.unwrap());
    let state = second.state().await;
    assert_eq!(layout(&state.pipeline), "A B D");
    assert!(state.is_updated);
    assert_eq!(state.pipeline_view.drawer, DrawerType::None);
    assert!(state.pipeline_view.selection.selected_stage_id.is_none());
    assert!(state.pipeline_view.is_split_view_open);

    // Already in sync
    assert!(!second.soft_fetch().await.unwrap());
}

#[tokio::test]
async fn test_soft_fetch_keeps_selection_that_still_exists() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    api.put_pipeline(&scope("p1"), &sample_pipeline("p1"));

    let first = loaded_store(&api, &cache, scope("p1")).await;
    let second = loaded_store(&api, &cache, scope("p1")).await;
    second.set_selection(SelectionState::stage("A")).await.unwrap();

    first.remove_stage("D", false).await.unwrap();

    assert!(second.soft_fetch().await.unwrap());
    let state = second.state().await;
    assert_eq!(layout(&state.pipeline), "A B C");
    assert_eq!(state.pipeline_view.selection.selected_stage_id.as_deref(), Some("A"));
}

#[tokio::test]
async fn test_listeners_see_every_change_until_unsubscribed() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    api.put_pipeline(&scope("p1"), &sample_pipeline("p1"));
    let store = loaded_store(&api, &cache, scope("p1")).await;

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let id = store
        .subscribe(move |state| {
            assert!(state.is_initialized);
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    store.remove_stage("A", false).await.unwrap();
    // Updating, then Updated
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    assert!(store.unsubscribe(id).await);
    store.remove_stage("B", false).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert!(!store.unsubscribe(id).await);
}

#[tokio::test]
async fn test_soft_fetch_after_other_session_reloaded_from_server() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    let mut v1 = sample_pipeline("p1");
    v1.name = "v1".to_string();
    api.put_pipeline(&scope("p1"), &v1);

    let first = loaded_store(&api, &cache, scope("p1")).await;
    let second = loaded_store(&api, &cache, scope("p1")).await;

    let mut v2 = v1.clone();
    v2.name = "v2".to_string();
    api.put_pipeline(&scope("p1"), &v2);
    second.reload_from_server().await.unwrap();

    assert!(first.soft_fetch().await.unwrap());
    let state = first.state().await;
    assert_eq!(state.pipeline.name, "v2");
    assert_eq!(state.original_pipeline.name, "v2");
    assert!(!state.is_updated);

    // The next write carries the adopted original
    first.remove_stage("A", false).await.unwrap();
    let entry = cache.get(&scope("p1")).await.unwrap().unwrap();
    assert_eq!(entry.original_pipeline.name, "v2");

    first
        .fetch(FetchOptions {
            force_fetch: true,
            force_update: false,
        })
        .await
        .unwrap();
    let state = first.state().await;
    assert!(!state.is_be_pipeline_updated);
    assert!(state.is_updated);
    assert_eq!(layout(&state.pipeline), "B [C D]");
}
