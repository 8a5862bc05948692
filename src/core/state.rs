//! Editor state models

use serde::{Deserialize, Serialize};

/// Lifecycle of the document store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreStatus {
    /// Nothing loaded yet
    Uninitialized,
    /// Local cache is being opened
    DbInitializing,
    /// Document is being loaded from the cache or the server
    Fetching,
    /// Document loaded and editable
    Ready,
    /// A write-through to the cache is in flight
    Updating,
    /// Cache or fetch failure; the editing surface shows an error page
    Error(StoreFailure),
}

impl StoreStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, StoreStatus::Error(_))
    }
}

/// Why the store entered its error state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreFailure {
    /// The local cache could not be opened or read
    Db(String),
    /// The document could not be fetched and no cached copy exists
    Fetch(String),
}

/// Side panel currently open in the editor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawerType {
    #[default]
    None,
    AddStage,
    StageConfig,
    StepConfig,
    PipelineVariables,
    PipelineNotifications,
    FlowControl,
    Templates,
}

/// What the user has selected on the canvas
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    pub selected_stage_id: Option<String>,
    pub selected_step_id: Option<String>,
    pub selected_section_id: Option<String>,
}

impl SelectionState {
    /// Select a stage, dropping any step/section selection
    pub fn stage(stage_id: impl Into<String>) -> Self {
        Self {
            selected_stage_id: Some(stage_id.into()),
            ..Self::default()
        }
    }
}

/// Transient UI state kept alongside the document in the local cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineViewState {
    pub drawer: DrawerType,
    pub is_split_view_open: bool,
    pub selection: SelectionState,
}

impl PipelineViewState {
    /// Close the side panel and clear the selection; the layout mode stays
    pub fn cleared(&self) -> Self {
        Self {
            drawer: DrawerType::None,
            is_split_view_open: self.is_split_view_open,
            selection: SelectionState::default(),
        }
    }
}

/// Version-control metadata of a file-backed pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitDetails {
    #[serde(default)]
    pub repo_identifier: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub root_folder: Option<String>,
    #[serde(default)]
    pub object_id: Option<String>,
    #[serde(default)]
    pub commit_id: Option<String>,
}
