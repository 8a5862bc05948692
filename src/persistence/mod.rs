//! Local cache for working copies of pipeline documents
//!
//! Entries survive restarts and are keyed by the full [`PipelineScope`], so
//! two branches or repos holding "the same" pipeline identifier never share
//! a working copy.

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteCache;

use crate::core::{GitDetails, Pipeline, PipelineScope, PipelineViewState, NEW_PIPELINE_IDENTIFIER};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::debug;

/// How many times opening the cache is attempted before giving up
pub const MAX_INIT_ATTEMPTS: u32 = 5;

/// A cached working copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Scope the entry belongs to
    pub key: PipelineScope,

    /// Working document, possibly unsaved
    pub pipeline: Pipeline,

    /// Last document known to match the server
    pub original_pipeline: Pipeline,

    /// Whether `pipeline` differs from `original_pipeline`
    pub is_updated: bool,

    /// Repo/branch/file metadata for git-backed documents
    #[serde(default)]
    pub git_details: Option<GitDetails>,

    /// UI state restored on reload
    #[serde(default)]
    pub pipeline_view: Option<PipelineViewState>,

    /// When the entry was last written
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(key: PipelineScope, pipeline: Pipeline, original_pipeline: Pipeline) -> Self {
        let is_updated = pipeline != original_pipeline;
        Self {
            key,
            pipeline,
            original_pipeline,
            is_updated,
            git_details: None,
            pipeline_view: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_git_details(mut self, git_details: Option<GitDetails>) -> Self {
        self.git_details = git_details;
        self
    }

    pub fn with_view(mut self, view: PipelineViewState) -> Self {
        self.pipeline_view = Some(view);
        self
    }
}

/// Errors raised by cache backends
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("local cache is not initialized")]
    NotInitialized,

    #[error("local cache initialization failed after {attempts} attempts: {reason}")]
    InitFailed { attempts: u32, reason: String },

    #[error("local cache schema version {found} is newer than supported version {supported}")]
    SchemaDowngrade { found: i64, supported: i64 },

    #[error("local cache error: {0}")]
    Backend(String),

    #[error("failed to encode cache entry: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub fn backend(context: &str, err: impl std::fmt::Display) -> Self {
        CacheError::Backend(format!("{}: {}", context, err))
    }
}

/// Trait for cache backends
#[async_trait::async_trait]
pub trait LocalCache: Send + Sync {
    /// Open the backing database, recovering from unusable state
    async fn init(&self) -> Result<(), CacheError>;

    /// Load the entry for a scope
    async fn get(&self, key: &PipelineScope) -> Result<Option<CacheEntry>, CacheError>;

    /// Store an entry under its own key, replacing any previous one
    async fn put(&self, entry: &CacheEntry) -> Result<(), CacheError>;

    /// Remove the entry for a scope; removing a missing entry is not an error
    async fn delete(&self, key: &PipelineScope) -> Result<(), CacheError>;
}

/// Delete the cache entry of a pipeline
///
/// A just-created pipeline briefly exists under both its real identifier and
/// the new-pipeline identifier, so the latter is removed from the same scope
/// as well.
pub async fn delete_pipeline_cache(cache: &dyn LocalCache, scope: &PipelineScope) -> Result<(), CacheError> {
    cache.delete(scope).await?;

    if !scope.is_new() {
        cache.delete(&scope.with_pipeline(NEW_PIPELINE_IDENTIFIER)).await?;
    }

    debug!("Deleted cache entry for {}", scope);
    Ok(())
}

/// In-memory cache (for testing or ephemeral use)
///
/// Cloning an `Arc` of it across several stores mimics browser tabs sharing
/// one database.
pub struct InMemoryCache {
    entries: tokio::sync::RwLock<HashMap<PipelineScope, CacheEntry>>,
    unavailable: AtomicBool,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: tokio::sync::RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every operation fail, as a broken database would
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn check_available(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CacheError::Backend("database unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LocalCache for InMemoryCache {
    async fn init(&self) -> Result<(), CacheError> {
        self.check_available().map_err(|err| CacheError::InitFailed {
            attempts: MAX_INIT_ATTEMPTS,
            reason: err.to_string(),
        })
    }

    async fn get(&self, key: &PipelineScope) -> Result<Option<CacheEntry>, CacheError> {
        self.check_available()?;
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.check_available()?;
        let mut entries = self.entries.write().await;
        entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &PipelineScope) -> Result<(), CacheError> {
        self.check_available()?;
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}
