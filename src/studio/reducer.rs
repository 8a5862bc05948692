//! Pure state transitions of the document store

use crate::core::{tree, GitDetails, Pipeline, PipelineScope, PipelineViewState, StoreStatus};
use crate::studio::Action;

/// Observable state of one open pipeline document
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStudioState {
    pub status: StoreStatus,
    pub scope: PipelineScope,

    /// Working copy, possibly with unsaved edits
    pub pipeline: Pipeline,

    /// Last copy known to match the server
    pub original_pipeline: Pipeline,

    pub git_details: Option<GitDetails>,
    pub pipeline_view: PipelineViewState,

    /// Working copy differs from the original (always true for a new pipeline)
    pub is_updated: bool,

    /// Server copy changed underneath the cached working copy
    pub is_be_pipeline_updated: bool,

    /// User chose to keep local edits; suppresses the conflict flag until the next explicit fetch
    pub remote_update_dismissed: bool,

    /// Server error from the last fetch when a cached copy was used instead
    pub fetch_error: Option<String>,

    /// A document has been loaded
    pub is_initialized: bool,
}

impl PipelineStudioState {
    pub fn new(scope: PipelineScope) -> Self {
        Self {
            status: StoreStatus::Uninitialized,
            scope,
            pipeline: Pipeline::new_default(),
            original_pipeline: Pipeline::new_default(),
            git_details: None,
            pipeline_view: PipelineViewState::default(),
            is_updated: false,
            is_be_pipeline_updated: false,
            remote_update_dismissed: false,
            fetch_error: None,
            is_initialized: false,
        }
    }
}

/// Apply an action to a state, producing the next state
pub fn reduce(state: &PipelineStudioState, action: Action) -> PipelineStudioState {
    let mut next = state.clone();

    match action {
        Action::DbInitStarted => {
            next.status = StoreStatus::DbInitializing;
        }
        Action::DbInitialized => {
            next.status = StoreStatus::Ready;
        }
        Action::Fetching => {
            next.status = StoreStatus::Fetching;
        }
        Action::Fetched {
            scope,
            pipeline,
            original_pipeline,
            is_updated,
            is_be_pipeline_updated,
            git_details,
            pipeline_view,
            fetch_error,
            force_fetch,
        } => {
            let dismissed = !force_fetch && state.remote_update_dismissed;

            next.status = StoreStatus::Ready;
            next.scope = scope;
            next.pipeline = pipeline;
            next.original_pipeline = original_pipeline;
            next.is_updated = is_updated;
            next.is_be_pipeline_updated = is_be_pipeline_updated && !dismissed;
            next.remote_update_dismissed = dismissed;
            next.git_details = git_details;
            next.pipeline_view = pipeline_view.unwrap_or_default();
            next.fetch_error = fetch_error;
            next.is_initialized = true;
        }
        Action::FetchAborted => {
            next.status = if state.is_initialized {
                StoreStatus::Ready
            } else {
                StoreStatus::Uninitialized
            };
        }
        Action::Failed(failure) => {
            next.status = StoreStatus::Error(failure);
        }
        Action::Updating => {
            next.status = StoreStatus::Updating;
        }
        Action::Updated { pipeline, is_updated } => {
            next.status = StoreStatus::Ready;
            next.pipeline = pipeline;
            next.is_updated = is_updated;
        }
        Action::Saved { scope, pipeline } => {
            next.status = StoreStatus::Ready;
            next.scope = scope;
            next.original_pipeline = pipeline.clone();
            next.pipeline = pipeline;
            next.is_updated = false;
            next.is_be_pipeline_updated = false;
            next.fetch_error = None;
        }
        Action::SoftFetched {
            pipeline,
            original_pipeline,
            git_details,
            is_updated,
        } => {
            let selection_gone = state
                .pipeline_view
                .selection
                .selected_stage_id
                .as_deref()
                .is_some_and(|id| tree::find_stage(&pipeline, id).is_none());

            if selection_gone {
                next.pipeline_view = state.pipeline_view.cleared();
            }
            next.pipeline = pipeline;
            next.original_pipeline = original_pipeline;
            next.git_details = git_details;
            next.is_updated = is_updated;
        }
        Action::ViewUpdated(view) => {
            next.pipeline_view = view;
        }
        Action::SelectionChanged(selection) => {
            next.pipeline_view.selection = selection;
        }
        Action::GitDetailsUpdated(git_details) => {
            next.git_details = git_details;
        }
        Action::RemoteUpdateDismissed => {
            next.is_be_pipeline_updated = false;
            next.remote_update_dismissed = true;
        }
        Action::ScopeChanged(scope) => {
            next.scope = scope;
        }
    }

    next
}
