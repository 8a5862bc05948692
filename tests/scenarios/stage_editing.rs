//! Test: Stage editing - structural edits through the store

use crate::helpers::*;
use pipeline_studio::core::{tree, InsertPosition, StageNode, StageType, TreeError};
use pipeline_studio::persistence::{InMemoryCache, LocalCache};
use pipeline_studio::studio::StudioError;
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[tokio::test]
async fn test_add_stage_in_parallel_and_after() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    api.put_pipeline(&scope("p1"), &sample_pipeline("p1"));
    let store = loaded_store(&api, &cache, scope("p1")).await;

    store
        .add_stage(custom_stage("E"), &InsertPosition::ParallelWith("A".to_string()))
        .await
        .unwrap();
    store
        .add_stage(custom_stage("F"), &InsertPosition::After("C".to_string()))
        .await
        .unwrap();

    let state = store.state().await;
    assert_eq!(layout(&state.pipeline), "[A E] B [C D] F");
    assert!(state.is_updated);

    // Written through
    let entry = cache.get(&scope("p1")).await.unwrap().unwrap();
    assert_eq!(layout(&entry.pipeline), "[A E] B [C D] F");
    assert!(entry.is_updated);
}

#[tokio::test]
async fn test_duplicate_stage_identifier_is_rejected() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    api.put_pipeline(&scope("p1"), &sample_pipeline("p1"));
    let store = loaded_store(&api, &cache, scope("p1")).await;

    let err = store
        .add_stage(stage("D", StageType::Approval), &InsertPosition::AtIndex(0))
        .await
        .unwrap_err();

    assert!(matches!(err, StudioError::Tree(TreeError::DuplicateIdentifier(ref id)) if id == "D"));
    let state = store.state().await;
    assert_eq!(layout(&state.pipeline), "A B [C D]");
    assert!(!state.is_updated);
}

#[tokio::test]
async fn test_move_before_source_stage_is_refused() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    let pipeline = pipeline_with(
        "p1",
        "Deploy",
        vec![
            StageNode::stage(stage("dev", StageType::Deployment)),
            StageNode::stage(cloned_from("prod", "dev")),
            StageNode::stage(custom_stage("notify")),
        ],
    );
    api.put_pipeline(&scope("p1"), &pipeline);
    let store = loaded_store(&api, &cache, scope("p1")).await;

    let err = store
        .move_stage("prod", &InsertPosition::AtIndex(0))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        TreeError::DependencyOrder {
            stage: "prod".to_string(),
            depends_on: "dev".to_string(),
        }
        .to_string()
    );

    // Running in parallel with its source is not "after" it either
    let err = store
        .move_stage("prod", &InsertPosition::ParallelWith("dev".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, StudioError::Tree(TreeError::DependencyOrder { .. })));
    assert_eq!(layout(&store.state().await.pipeline), "dev prod notify");

    store
        .move_stage("notify", &InsertPosition::AtIndex(0))
        .await
        .unwrap();
    assert_eq!(layout(&store.state().await.pipeline), "notify dev prod");
}

#[tokio::test]
async fn test_remove_stage_with_dependents_needs_force() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    let pipeline = pipeline_with(
        "p1",
        "Deploy",
        vec![
            StageNode::stage(stage("dev", StageType::Deployment)),
            StageNode::parallel(vec![cloned_from("qa", "dev"), cloned_from("prod", "dev")]),
        ],
    );
    api.put_pipeline(&scope("p1"), &pipeline);
    let store = loaded_store(&api, &cache, scope("p1")).await;

    let err = store.remove_stage("dev", false).await.unwrap_err();
    match err {
        StudioError::Tree(TreeError::HasDependents { stage, dependents }) => {
            assert_eq!(stage, "dev");
            assert_eq!(dependents, vec!["qa".to_string(), "prod".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }

    store.remove_stage("dev", true).await.unwrap();
    assert_eq!(layout(&store.state().await.pipeline), "[qa prod]");

    // Last but one member leaves the group
    store.remove_stage("qa", false).await.unwrap();
    assert_eq!(layout(&store.state().await.pipeline), "prod");
}

#[tokio::test]
async fn test_update_nested_stage() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    api.put_pipeline(&scope("p1"), &sample_pipeline("p1"));
    let store = loaded_store(&api, &cache, scope("p1")).await;

    let mut d = custom_stage("D");
    d.name = "Deploy docs".to_string();
    store.update_stage(d).await.unwrap();

    let state = store.state().await;
    assert_eq!(tree::find_stage(&state.pipeline, "D").unwrap().stage.name, "Deploy docs");
    assert!(tree::find_stage(&state.pipeline, "D").unwrap().parent.is_some());
    assert!(state.is_updated);

    let err = store.update_stage(custom_stage("Z")).await.unwrap_err();
    assert!(matches!(err, StudioError::Tree(TreeError::StageNotFound(ref id)) if id == "Z"));
}

#[tokio::test]
async fn test_reverting_edits_clears_dirty_flag() {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    api.put_pipeline(&scope("p1"), &sample_pipeline("p1"));
    let store = loaded_store(&api, &cache, scope("p1")).await;

    store.remove_stage("B", false).await.unwrap();
    assert!(store.state().await.is_updated);

    store
        .add_stage(custom_stage("B"), &InsertPosition::AtIndex(1))
        .await
        .unwrap();
    assert!(!store.state().await.is_updated);
}
