//! Observable document store - loads, edits, caches and saves one pipeline

use crate::{
    api::{ApiError, PipelineApi, RemotePipeline, SaveOutcome, SchemaError},
    core::{
        config::is_valid_identifier, tree, GitDetails, InsertPosition, Pipeline, PipelineDocument, PipelineScope,
        PipelineViewState, SelectionState, Stage, StoreFailure, TreeError,
    },
    persistence::{delete_pipeline_cache, CacheEntry, CacheError, LocalCache},
    studio::{
        reconcile::{reconcile, ReconcileInput},
        reduce, Action, PipelineStudioState,
    },
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Errors returned by store operations
#[derive(Debug, Error)]
pub enum StudioError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Document(#[from] anyhow::Error),

    #[error("pipeline identifier cannot change from '{from}' to '{to}' through an update")]
    IdentifierChanged { from: String, to: String },

    #[error("invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    #[error("pipeline '{0}' not found")]
    NotFound(String),

    #[error("no pipeline is loaded")]
    NotReady,
}

/// Flags for [`PipelineStore::fetch`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Read the server even when a cached copy exists
    pub force_fetch: bool,
    /// Replace the cached working copy with the server copy
    pub force_update: bool,
}

impl FetchOptions {
    pub fn forced() -> Self {
        Self {
            force_fetch: true,
            force_update: true,
        }
    }
}

/// Result of [`PipelineStore::save`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveResult {
    Created { identifier: String },
    Updated { identifier: String },
    /// Server rejected the document; state is unchanged
    Invalid(Vec<SchemaError>),
}

/// Handle returned by [`PipelineStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

/// Type for state listeners
pub type Listener = Arc<dyn Fn(&PipelineStudioState) + Send + Sync>;

/// State container for one open pipeline document
pub struct PipelineStore<A> {
    api: Arc<A>,
    cache: Arc<dyn LocalCache>,
    state: RwLock<PipelineStudioState>,
    listeners: Mutex<HashMap<SubscriptionId, Listener>>,
    abort: watch::Sender<u64>,
}

impl<A: PipelineApi + 'static> PipelineStore<A> {
    pub fn new(api: Arc<A>, cache: Arc<dyn LocalCache>, scope: PipelineScope) -> Self {
        let (abort, _) = watch::channel(0);
        Self {
            api,
            cache,
            state: RwLock::new(PipelineStudioState::new(scope)),
            listeners: Mutex::new(HashMap::new()),
            abort,
        }
    }

    /// Snapshot of the current state
    pub async fn state(&self) -> PipelineStudioState {
        self.state.read().await.clone()
    }

    /// Register a listener called with a snapshot after every action
    pub async fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&PipelineStudioState) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.listeners.lock().await.insert(id, Arc::new(listener));
        id
    }

    /// Remove a listener; returns whether it was registered
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.lock().await.remove(&id).is_some()
    }

    async fn dispatch(&self, action: Action) -> PipelineStudioState {
        debug!("Dispatching {}", action.name());
        let snapshot = {
            let mut state = self.state.write().await;
            *state = reduce(&state, action);
            state.clone()
        };

        let listeners = self.listeners.lock().await;
        for listener in listeners.values() {
            listener(&snapshot);
        }
        snapshot
    }

    /// Open the local cache
    pub async fn initialize(&self) -> Result<(), StudioError> {
        self.dispatch(Action::DbInitStarted).await;

        match self.cache.init().await {
            Ok(()) => {
                self.dispatch(Action::DbInitialized).await;
                Ok(())
            }
            Err(err) => {
                error!("Local cache unavailable: {}", err);
                self.dispatch(Action::Failed(StoreFailure::Db(err.to_string()))).await;
                Err(err.into())
            }
        }
    }

    /// Load the document from the cache and, when needed, the server
    pub async fn fetch(&self, options: FetchOptions) -> Result<(), StudioError> {
        let (scope, current_view) = {
            let state = self.state.read().await;
            (state.scope.clone(), state.pipeline_view.clone())
        };
        info!("Fetching pipeline {}", scope);
        self.dispatch(Action::Fetching).await;

        let cached = match self.cache.get(&scope).await {
            Ok(cached) => cached,
            Err(err) => {
                error!("Failed to read local cache: {}", err);
                self.dispatch(Action::Failed(StoreFailure::Db(err.to_string()))).await;
                return Err(err.into());
            }
        };

        let needs_server = !scope.is_new() && (cached.is_none() || options.force_fetch);
        let mut fetch_error = None;
        let mut remote = None;

        if needs_server {
            match self.read_server(&scope).await {
                Ok(Some(found)) => remote = Some(found),
                Ok(None) => {}
                Err(StudioError::Api(ApiError::Aborted)) => {
                    info!("Fetch of {} aborted", scope);
                    self.dispatch(Action::FetchAborted).await;
                    return Err(ApiError::Aborted.into());
                }
                Err(err) if cached.is_some() => {
                    warn!("Server fetch failed, keeping cached copy: {}", err);
                    fetch_error = Some(err.to_string());
                }
                Err(err) => {
                    error!("Server fetch failed: {}", err);
                    self.dispatch(Action::Failed(StoreFailure::Fetch(err.to_string()))).await;
                    return Err(err);
                }
            }
        }

        let server_pipeline = remote.as_ref().map(|(pipeline, _)| pipeline);
        let reconciled = reconcile(ReconcileInput {
            cached: cached.as_ref(),
            server: server_pipeline,
            is_new: scope.is_new(),
            // Without a server copy, a forced update cannot replace anything
            force_update: options.force_update && fetch_error.is_none(),
        });

        let Some(result) = reconciled else {
            let message = format!("Pipeline '{}' not found", scope.pipeline_identifier);
            warn!("{}", message);
            self.dispatch(Action::Failed(StoreFailure::Fetch(message))).await;
            return Err(StudioError::NotFound(scope.pipeline_identifier.clone()));
        };

        let git_details = remote
            .as_ref()
            .and_then(|(_, git)| git.clone())
            .or_else(|| cached.as_ref().and_then(|entry| entry.git_details.clone()));

        let pipeline_view = if result.from_cache {
            cached.as_ref().and_then(|entry| entry.pipeline_view.clone())
        } else {
            Some(current_view)
        };

        if result.write_through {
            let entry = CacheEntry {
                key: scope.clone(),
                pipeline: result.working.clone(),
                original_pipeline: result.original.clone(),
                is_updated: result.is_updated,
                git_details: git_details.clone(),
                pipeline_view: pipeline_view.clone(),
                updated_at: Utc::now(),
            };
            if let Err(err) = self.cache.put(&entry).await {
                error!("Failed to write fetched pipeline to local cache: {}", err);
                self.dispatch(Action::Failed(StoreFailure::Db(err.to_string()))).await;
                return Err(err.into());
            }
        }

        if result.is_be_pipeline_updated {
            info!("Pipeline {} was updated on the server since it was cached", scope);
        }

        self.dispatch(Action::Fetched {
            scope,
            pipeline: result.working,
            original_pipeline: result.original,
            is_updated: result.is_updated,
            is_be_pipeline_updated: result.is_be_pipeline_updated,
            git_details,
            pipeline_view,
            fetch_error,
            force_fetch: options.force_fetch,
        })
        .await;

        Ok(())
    }

    /// Read and parse the server copy, racing the abort signal
    async fn read_server(&self, scope: &PipelineScope) -> Result<Option<(Pipeline, Option<GitDetails>)>, StudioError> {
        let mut abort = self.abort.subscribe();

        let response = tokio::select! {
            response = self.api.get_pipeline(scope) => response?,
            _ = abort.changed() => return Err(ApiError::Aborted.into()),
        };

        match response {
            Some(RemotePipeline { yaml_pipeline, git_details }) => {
                let document = PipelineDocument::parse(&yaml_pipeline)?;
                Ok(Some((document.into_pipeline(), git_details)))
            }
            None => Ok(None),
        }
    }

    /// Cancel any in-flight server fetch
    pub fn abort(&self) {
        self.abort.send_modify(|generation| *generation += 1);
    }

    /// Replace the working document
    pub async fn update(&self, pipeline: Pipeline) -> Result<(), StudioError> {
        {
            let state = self.state.read().await;
            if !state.is_initialized {
                return Err(StudioError::NotReady);
            }
            if pipeline.identifier != state.pipeline.identifier {
                return Err(StudioError::IdentifierChanged {
                    from: state.pipeline.identifier.clone(),
                    to: pipeline.identifier,
                });
            }
        }
        self.commit(pipeline).await
    }

    /// Replace the working document with a function of the current one
    pub async fn update_with<F>(&self, f: F) -> Result<(), StudioError>
    where
        F: FnOnce(&Pipeline) -> Pipeline,
    {
        let next = {
            let state = self.state.read().await;
            f(&state.pipeline)
        };
        self.update(next).await
    }

    /// Apply an edit to a copy of the working document and commit it
    pub async fn edit_stages<T, F>(&self, f: F) -> Result<T, StudioError>
    where
        F: FnOnce(&mut Pipeline) -> Result<T, TreeError>,
    {
        let mut next = {
            let state = self.state.read().await;
            if !state.is_initialized {
                return Err(StudioError::NotReady);
            }
            state.pipeline.clone()
        };
        let value = f(&mut next)?;
        self.update(next).await?;
        Ok(value)
    }

    /// Replace a stage by identifier anywhere in the tree
    pub async fn update_stage(&self, stage: Stage) -> Result<(), StudioError> {
        self.edit_stages(|pipeline| {
            let identifier = stage.identifier.clone();
            if tree::replace_stage(pipeline, stage) {
                Ok(())
            } else {
                Err(TreeError::StageNotFound(identifier))
            }
        })
        .await
    }

    pub async fn add_stage(&self, stage: Stage, position: &InsertPosition) -> Result<(), StudioError> {
        self.edit_stages(|pipeline| {
            if tree::is_duplicate_identifier(pipeline, &stage.identifier) {
                return Err(TreeError::DuplicateIdentifier(stage.identifier));
            }
            tree::insert_stage(pipeline, stage, position);
            Ok(())
        })
        .await
    }

    /// Remove a stage; stages configured from it block removal unless `force`
    pub async fn remove_stage(&self, id: &str, force: bool) -> Result<(), StudioError> {
        self.edit_stages(|pipeline| {
            let dependents = tree::dependent_stages(pipeline, id);
            if !dependents.is_empty() && !force {
                return Err(TreeError::HasDependents {
                    stage: id.to_string(),
                    dependents,
                });
            }
            if tree::remove_stage(pipeline, id) {
                Ok(())
            } else {
                Err(TreeError::StageNotFound(id.to_string()))
            }
        })
        .await?;

        let view = self.state.read().await.pipeline_view.clone();
        if view.selection.selected_stage_id.as_deref() == Some(id) {
            self.update_pipeline_view(view.cleared()).await?;
        }
        Ok(())
    }

    pub async fn move_stage(&self, id: &str, position: &InsertPosition) -> Result<(), StudioError> {
        self.edit_stages(|pipeline| tree::move_stage(pipeline, id, position)).await
    }

    /// Change the working document's identifier
    ///
    /// The scope keeps addressing the stored pipeline until the next save.
    pub async fn rename(&self, identifier: &str) -> Result<(), StudioError> {
        if !is_valid_identifier(identifier) {
            return Err(StudioError::InvalidIdentifier(identifier.to_string()));
        }

        let mut next = {
            let state = self.state.read().await;
            if !state.is_initialized {
                return Err(StudioError::NotReady);
            }
            state.pipeline.clone()
        };
        info!("Renaming pipeline '{}' to '{}'", next.identifier, identifier);
        next.identifier = identifier.to_string();
        self.commit(next).await
    }

    /// Write through to the cache, then apply in memory
    ///
    /// A failed cache write still applies the edit in memory and is reported
    /// to the caller.
    async fn commit(&self, pipeline: Pipeline) -> Result<(), StudioError> {
        let entry = {
            let state = self.state.read().await;
            let is_updated = state.scope.is_new() || pipeline != state.original_pipeline;
            CacheEntry {
                key: state.scope.clone(),
                pipeline,
                original_pipeline: state.original_pipeline.clone(),
                is_updated,
                git_details: state.git_details.clone(),
                pipeline_view: Some(state.pipeline_view.clone()),
                updated_at: Utc::now(),
            }
        };

        self.dispatch(Action::Updating).await;
        let written = self.cache.put(&entry).await;
        if let Err(err) = &written {
            error!("Failed to write pipeline to local cache: {}", err);
        }

        self.dispatch(Action::Updated {
            pipeline: entry.pipeline,
            is_updated: entry.is_updated,
        })
        .await;

        written.map_err(StudioError::from)
    }

    /// Send the working document to the server
    ///
    /// Works from a snapshot taken before the server call; edits must not
    /// overlap a save or the saved state replaces them.
    pub async fn save(&self) -> Result<SaveResult, StudioError> {
        let state = self.state().await;
        if !state.is_initialized {
            return Err(StudioError::NotReady);
        }

        let yaml = PipelineDocument::new(state.pipeline.clone()).to_yaml()?;
        let is_new = state.scope.is_new();
        info!("Saving pipeline {}", state.scope);

        let outcome = if is_new {
            self.api.create_pipeline(&state.scope, &yaml).await?
        } else {
            self.api.update_pipeline(&state.scope, &yaml).await?
        };

        let identifier = match outcome {
            SaveOutcome::Invalid(errors) => {
                warn!("Pipeline {} rejected with {} schema errors", state.scope, errors.len());
                return Ok(SaveResult::Invalid(errors));
            }
            SaveOutcome::Saved { identifier } => identifier,
        };

        let scope = state.scope.with_pipeline(identifier.clone());
        let mut pipeline = state.pipeline;
        pipeline.identifier = identifier.clone();

        // The server already has the document; stale cache entries are only logged
        if let Err(err) = delete_pipeline_cache(self.cache.as_ref(), &scope).await {
            warn!("Failed to clear cache for {}: {}", scope, err);
        }
        if scope != state.scope {
            if let Err(err) = self.cache.delete(&state.scope).await {
                warn!("Failed to clear cache for {}: {}", state.scope, err);
            }
        }

        info!("Saved pipeline {}", scope);
        self.dispatch(Action::Saved { scope, pipeline }).await;

        Ok(if is_new {
            SaveResult::Created { identifier }
        } else {
            SaveResult::Updated { identifier }
        })
    }

    /// Adopt the cached copy when another session changed it
    ///
    /// The cached original comes along with the working copy, so the dirty
    /// flag reflects what the other session last saw from the server.
    pub async fn soft_fetch(&self) -> Result<bool, StudioError> {
        let (scope, pipeline, original) = {
            let state = self.state.read().await;
            if !state.is_initialized {
                return Ok(false);
            }
            (state.scope.clone(), state.pipeline.clone(), state.original_pipeline.clone())
        };

        let Some(entry) = self.cache.get(&scope).await? else {
            return Ok(false);
        };
        if entry.pipeline == pipeline && entry.original_pipeline == original {
            return Ok(false);
        }

        debug!("Adopting cached copy of {}", scope);
        let is_updated = scope.is_new() || entry.pipeline != entry.original_pipeline;
        self.dispatch(Action::SoftFetched {
            pipeline: entry.pipeline,
            original_pipeline: entry.original_pipeline,
            git_details: entry.git_details,
            is_updated,
        })
        .await;
        Ok(true)
    }

    /// Replace the UI state and persist it with the working copy
    pub async fn update_pipeline_view(&self, view: PipelineViewState) -> Result<(), StudioError> {
        let state = self.dispatch(Action::ViewUpdated(view)).await;
        self.write_entry(&state).await
    }

    pub async fn set_selection(&self, selection: SelectionState) -> Result<(), StudioError> {
        let state = self.dispatch(Action::SelectionChanged(selection)).await;
        self.write_entry(&state).await
    }

    pub async fn update_git_details(&self, git_details: Option<GitDetails>) -> Result<(), StudioError> {
        let state = self.dispatch(Action::GitDetailsUpdated(git_details)).await;
        self.write_entry(&state).await
    }

    async fn write_entry(&self, state: &PipelineStudioState) -> Result<(), StudioError> {
        if !state.is_initialized {
            return Ok(());
        }
        let entry = CacheEntry {
            key: state.scope.clone(),
            pipeline: state.pipeline.clone(),
            original_pipeline: state.original_pipeline.clone(),
            is_updated: state.is_updated,
            git_details: state.git_details.clone(),
            pipeline_view: Some(state.pipeline_view.clone()),
            updated_at: Utc::now(),
        };
        self.cache.put(&entry).await?;
        Ok(())
    }

    /// Move to another repo/branch of the same pipeline
    pub async fn switch_git_context(&self, repo_identifier: &str, branch: &str) -> Result<(), StudioError> {
        let old_scope = self.state.read().await.scope.clone();
        let new_scope = old_scope.clone().with_git(repo_identifier, branch);
        if new_scope == old_scope {
            return Ok(());
        }

        info!("Switching {} to {}", old_scope, new_scope);
        self.cache.delete(&old_scope).await?;
        self.dispatch(Action::ScopeChanged(new_scope)).await;
        self.fetch(FetchOptions::default()).await
    }

    /// Keep local edits over a newer server copy for this session
    pub async fn keep_local_edits(&self) {
        self.dispatch(Action::RemoteUpdateDismissed).await;
    }

    /// Replace local edits with the server copy
    pub async fn reload_from_server(&self) -> Result<(), StudioError> {
        self.fetch(FetchOptions::forced()).await
    }

    /// Drop local edits and reload
    pub async fn discard(&self) -> Result<(), StudioError> {
        let scope = self.state.read().await.scope.clone();
        info!("Discarding local edits of {}", scope);
        delete_pipeline_cache(self.cache.as_ref(), &scope).await?;
        self.fetch(FetchOptions {
            force_fetch: true,
            force_update: false,
        })
        .await
    }
}
