//! Translating renderer intents into document edits

use crate::api::PipelineApi;
use crate::core::{
    tree, DrawerType, InsertPosition, PipelineViewState, SelectionState, Stage, StageSpec, StageType, TreeError,
};
use crate::studio::{PipelineStore, StudioError};
use tracing::debug;

/// What the user did on the canvas
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagramEvent {
    /// A stage node was clicked
    NodeClicked { stage_id: String },
    /// A stage was dragged onto the link in front of top-level entry `index`
    LinkDrop { stage_id: String, index: usize },
    /// A stage was dragged onto another node
    NodeDrop { stage_id: String, onto: String },
    /// The remove button of a node was pressed
    NodeRemoved { stage_id: String },
    /// Add a stage after `after` (or at the end); unnamed stages start as placeholders
    AddStage {
        name: Option<String>,
        kind: StageType,
        after: Option<String>,
    },
    /// Add a placeholder stage in parallel with `with`
    AddParallel { kind: StageType, with: String },
}

/// Apply a diagram event to the store
pub async fn handle_event<A: PipelineApi + 'static>(store: &PipelineStore<A>, event: DiagramEvent) -> Result<(), StudioError> {
    debug!("Diagram event: {:?}", event);

    match event {
        DiagramEvent::NodeClicked { stage_id } => open_stage(store, &stage_id).await,
        DiagramEvent::LinkDrop { stage_id, index } => {
            store
                .edit_stages(|pipeline| {
                    let from = tree::top_level_index(pipeline, &stage_id)
                        .ok_or_else(|| TreeError::StageNotFound(stage_id.clone()))?;
                    // Taking out a bare entry shifts everything after it
                    let leaves_gap = pipeline.stages[from].stages().len() == 1;
                    let target = if leaves_gap && from < index { index - 1 } else { index };
                    tree::move_stage(pipeline, &stage_id, &InsertPosition::AtIndex(target))
                })
                .await
        }
        DiagramEvent::NodeDrop { stage_id, onto } => {
            store
                .edit_stages(|pipeline| {
                    let target_is_placeholder = tree::find_stage(pipeline, &onto)
                        .ok_or_else(|| TreeError::StageNotFound(onto.clone()))?
                        .stage
                        .is_placeholder();

                    if !target_is_placeholder {
                        return tree::move_stage(pipeline, &stage_id, &InsertPosition::ParallelWith(onto.clone()));
                    }
                    if stage_id == onto {
                        return Err(TreeError::SelfTarget(stage_id.clone()));
                    }

                    let dragged = tree::find_stage(pipeline, &stage_id)
                        .ok_or_else(|| TreeError::StageNotFound(stage_id.clone()))?
                        .stage
                        .clone();
                    tree::remove_stage(pipeline, &stage_id);
                    if let Some(slot) = tree::find_stage_mut(pipeline, &onto) {
                        *slot = dragged;
                    }
                    tree::validate_stage_order(pipeline)
                })
                .await
        }
        DiagramEvent::NodeRemoved { stage_id } => store.remove_stage(&stage_id, false).await,
        DiagramEvent::AddStage { name, kind, after } => {
            let state = store.state().await;
            let pipeline = &state.pipeline;

            // Only one unconfigured stage at a time
            let stale_placeholder = tree::find_placeholder_stage(pipeline).map(|stage| stage.identifier.clone());

            let stage = match name {
                Some(name) => {
                    let base = tree::identifier_from_name(&name);
                    let identifier = tree::unique_identifier(pipeline, &base);
                    Stage::new(identifier, name, StageSpec::empty(kind))
                }
                None => {
                    let identifier = tree::unique_identifier(pipeline, tree::DEFAULT_STAGE_IDENTIFIER);
                    Stage::placeholder(identifier, kind)
                }
            };
            let stage_id = stage.identifier.clone();
            let position = match after {
                Some(after) => InsertPosition::After(after),
                None => InsertPosition::AtIndex(usize::MAX),
            };

            store
                .edit_stages(|pipeline| {
                    if let Some(placeholder) = &stale_placeholder {
                        tree::remove_stage(pipeline, placeholder);
                    }
                    tree::insert_stage(pipeline, stage, &position);
                    Ok(())
                })
                .await?;
            open_stage(store, &stage_id).await
        }
        DiagramEvent::AddParallel { kind, with } => {
            let state = store.state().await;
            let identifier = tree::unique_identifier(&state.pipeline, tree::DEFAULT_STAGE_IDENTIFIER);
            let stage = Stage::placeholder(identifier, kind);
            let stage_id = stage.identifier.clone();

            store.add_stage(stage, &InsertPosition::ParallelWith(with)).await?;
            open_stage(store, &stage_id).await
        }
    }
}

/// Select a stage and open its configuration panel
async fn open_stage<A: PipelineApi + 'static>(store: &PipelineStore<A>, stage_id: &str) -> Result<(), StudioError> {
    let view = store.state().await.pipeline_view;
    store
        .update_pipeline_view(PipelineViewState {
            drawer: DrawerType::StageConfig,
            selection: SelectionState::stage(stage_id),
            ..view
        })
        .await
}
