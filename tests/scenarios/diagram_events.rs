//! Test: Diagram events - canvas intents turned into edits

use crate::helpers::*;
use pipeline_studio::core::{tree, DrawerType, PipelineDocument, StageType, EMPTY_STAGE_NAME};
use pipeline_studio::diagram::{handle_event, DiagramEvent};
use pipeline_studio::persistence::{InMemoryCache, LocalCache};
use pipeline_studio::studio::PipelineStore;
use pretty_assertions::assert_eq;
use std::sync::Arc;

async fn sample_store() -> (Arc<InMemoryCache>, PipelineStore<MockPipelineApi>) {
    let api = Arc::new(MockPipelineApi::new());
    let cache = Arc::new(InMemoryCache::new());
    api.put_pipeline(&scope("p1"), &sample_pipeline("p1"));
    let store = loaded_store(&api, &cache, scope("p1")).await;
    (cache, store)
}

#[tokio::test]
async fn test_clicking_a_node_opens_its_config() {
    let (cache, store) = sample_store().await;

    handle_event(&store, DiagramEvent::NodeClicked { stage_id: "C".into() })
        .await
        .unwrap();

    let view = store.state().await.pipeline_view;
    assert_eq!(view.drawer, DrawerType::StageConfig);
    assert_eq!(view.selection.selected_stage_id.as_deref(), Some("C"));

    let entry = cache.get(&scope("p1")).await.unwrap().unwrap();
    assert_eq!(entry.pipeline_view, Some(view));
    assert!(!entry.is_updated);
}

#[tokio::test]
async fn test_removing_selected_node_closes_the_drawer() {
    let (_cache, store) = sample_store().await;

    handle_event(&store, DiagramEvent::NodeClicked { stage_id: "B".into() })
        .await
        .unwrap();
    handle_event(&store, DiagramEvent::NodeRemoved { stage_id: "B".into() })
        .await
        .unwrap();

    let state = store.state().await;
    assert_eq!(layout(&state.pipeline), "A [C D]");
    assert_eq!(state.pipeline_view.drawer, DrawerType::None);
    assert_eq!(state.pipeline_view.selection.selected_stage_id, None);
}

#[tokio::test]
async fn test_add_named_stage_derives_identifier() {
    let (_cache, store) = sample_store().await;

    handle_event(
        &store,
        DiagramEvent::AddStage {
            name: Some("Build Image!".into()),
            kind: StageType::Build,
            after: Some("A".into()),
        },
    )
    .await
    .unwrap();

    let state = store.state().await;
    assert_eq!(layout(&state.pipeline), "A Build_Image B [C D]");
    let added = state.pipeline.stage("Build_Image").unwrap();
    assert_eq!(added.name, "Build Image!");
    assert_eq!(added.stage_type(), StageType::Build);
    assert_eq!(state.pipeline_view.selection.selected_stage_id.as_deref(), Some("Build_Image"));
}

#[tokio::test]
async fn test_name_without_identifier_characters_gets_default_identifier() {
    let (_cache, store) = sample_store().await;

    for _ in 0..2 {
        handle_event(
            &store,
            DiagramEvent::AddStage {
                name: Some("!!!".into()),
                kind: StageType::Custom,
                after: None,
            },
        )
        .await
        .unwrap();
    }

    let state = store.state().await;
    assert_eq!(tree::stage_identifiers(&state.pipeline), vec!["A", "B", "C", "D", "stage", "stage_1"]);
    assert_eq!(state.pipeline.stage("stage").unwrap().name, "!!!");
    assert!(PipelineDocument::new(state.pipeline).validate().is_ok());
}

#[tokio::test]
async fn test_only_one_placeholder_at_a_time() {
    let (_cache, store) = sample_store().await;
    let unnamed = DiagramEvent::AddStage {
        name: None,
        kind: StageType::Deployment,
        after: None,
    };

    handle_event(&store, unnamed.clone()).await.unwrap();
    let first = store.state().await;
    assert_eq!(layout(&first.pipeline), "A B [C D] stage");
    assert_eq!(first.pipeline.stage("stage").unwrap().name, EMPTY_STAGE_NAME);

    handle_event(&store, unnamed).await.unwrap();
    let second = store.state().await;
    let placeholders = tree::flatten_stages(&second.pipeline)
        .into_iter()
        .filter(|stage| stage.is_placeholder())
        .count();
    assert_eq!(placeholders, 1);
    assert_eq!(layout(&second.pipeline), "A B [C D] stage_1");
}

#[tokio::test]
async fn test_drop_onto_placeholder_takes_its_place() {
    let (_cache, store) = sample_store().await;

    handle_event(
        &store,
        DiagramEvent::AddParallel {
            kind: StageType::Custom,
            with: "C".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(layout(&store.state().await.pipeline), "A B [C D stage]");

    handle_event(
        &store,
        DiagramEvent::NodeDrop {
            stage_id: "A".into(),
            onto: "stage".into(),
        },
    )
    .await
    .unwrap();

    let state = store.state().await;
    assert_eq!(layout(&state.pipeline), "B [C D A]");
    assert!(tree::find_placeholder_stage(&state.pipeline).is_none());
}

#[tokio::test]
async fn test_drop_onto_stage_runs_in_parallel() {
    let (_cache, store) = sample_store().await;

    handle_event(
        &store,
        DiagramEvent::NodeDrop {
            stage_id: "D".into(),
            onto: "A".into(),
        },
    )
    .await
    .unwrap();

    assert_eq!(layout(&store.state().await.pipeline), "[A D] B C");
}

#[tokio::test]
async fn test_link_drop_positions() {
    let (_cache, store) = sample_store().await;

    // A dropped on the link in front of the group lands right before it
    handle_event(
        &store,
        DiagramEvent::LinkDrop {
            stage_id: "A".into(),
            index: 2,
        },
    )
    .await
    .unwrap();
    assert_eq!(layout(&store.state().await.pipeline), "B A [C D]");

    // Leaving a group keeps the group's slot
    handle_event(
        &store,
        DiagramEvent::LinkDrop {
            stage_id: "C".into(),
            index: 0,
        },
    )
    .await
    .unwrap();
    assert_eq!(layout(&store.state().await.pipeline), "C B A D");
}
