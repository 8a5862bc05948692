//! Actions dispatched through the store

use crate::core::{GitDetails, Pipeline, PipelineScope, PipelineViewState, SelectionState, StoreFailure};

/// Everything that can change [`PipelineStudioState`](super::PipelineStudioState)
#[derive(Debug, Clone)]
pub enum Action {
    DbInitStarted,
    DbInitialized,
    Fetching,
    Fetched {
        scope: PipelineScope,
        pipeline: Pipeline,
        original_pipeline: Pipeline,
        is_updated: bool,
        is_be_pipeline_updated: bool,
        git_details: Option<GitDetails>,
        pipeline_view: Option<PipelineViewState>,
        fetch_error: Option<String>,
        /// Explicit user-triggered fetch; resets the dismissed-conflict flag
        force_fetch: bool,
    },
    FetchAborted,
    Failed(StoreFailure),
    Updating,
    Updated {
        pipeline: Pipeline,
        is_updated: bool,
    },
    Saved {
        scope: PipelineScope,
        pipeline: Pipeline,
    },
    /// Cached entry written by another session
    SoftFetched {
        pipeline: Pipeline,
        original_pipeline: Pipeline,
        git_details: Option<GitDetails>,
        is_updated: bool,
    },
    ViewUpdated(PipelineViewState),
    SelectionChanged(SelectionState),
    GitDetailsUpdated(Option<GitDetails>),
    RemoteUpdateDismissed,
    ScopeChanged(PipelineScope),
}

impl Action {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Action::DbInitStarted => "DbInitStarted",
            Action::DbInitialized => "DbInitialized",
            Action::Fetching => "Fetching",
            Action::Fetched { .. } => "Fetched",
            Action::FetchAborted => "FetchAborted",
            Action::Failed(_) => "Failed",
            Action::Updating => "Updating",
            Action::Updated { .. } => "Updated",
            Action::Saved { .. } => "Saved",
            Action::SoftFetched { .. } => "SoftFetched",
            Action::ViewUpdated(_) => "ViewUpdated",
            Action::SelectionChanged(_) => "SelectionChanged",
            Action::GitDetailsUpdated(_) => "GitDetailsUpdated",
            Action::RemoteUpdateDismissed => "RemoteUpdateDismissed",
            Action::ScopeChanged(_) => "ScopeChanged",
        }
    }
}
