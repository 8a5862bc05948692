//! Deciding between the cached working copy and the server copy

use crate::core::Pipeline;
use crate::persistence::CacheEntry;

/// What is known when a fetch completes
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    pub cached: Option<&'a CacheEntry>,
    /// `None` when the server was not asked or does not know the pipeline
    pub server: Option<&'a Pipeline>,
    /// The scope carries the new-pipeline identifier
    pub is_new: bool,
    /// Discard the cached working copy in favour of the server
    pub force_update: bool,
}

/// The document the store should show
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub working: Pipeline,
    pub original: Pipeline,
    pub is_updated: bool,
    pub is_be_pipeline_updated: bool,
    /// The result must be written back to the cache
    pub write_through: bool,
    /// The working copy came from the cache
    pub from_cache: bool,
}

impl Reconciliation {
    fn from_server(server: &Pipeline) -> Self {
        Self {
            working: server.clone(),
            original: server.clone(),
            is_updated: false,
            is_be_pipeline_updated: false,
            write_through: true,
            from_cache: false,
        }
    }

    fn fresh_default() -> Self {
        let pipeline = Pipeline::new_default();
        Self {
            working: pipeline.clone(),
            original: pipeline,
            // An unsaved new document is always dirty
            is_updated: true,
            is_be_pipeline_updated: false,
            write_through: true,
            from_cache: false,
        }
    }
}

/// Apply the reconciliation table; `None` means the pipeline does not exist
pub fn reconcile(input: ReconcileInput<'_>) -> Option<Reconciliation> {
    match (input.cached, input.server) {
        (None, _) if input.is_new => Some(Reconciliation::fresh_default()),
        (None, Some(server)) => Some(Reconciliation::from_server(server)),
        (None, None) => None,

        (Some(_), Some(server)) if input.force_update => Some(Reconciliation::from_server(server)),
        (Some(_), None) if input.force_update => input.is_new.then(Reconciliation::fresh_default),

        (Some(cached), Some(server)) => Some(Reconciliation {
            working: cached.pipeline.clone(),
            original: server.clone(),
            is_updated: input.is_new || cached.pipeline != *server,
            is_be_pipeline_updated: *server != cached.original_pipeline,
            write_through: false,
            from_cache: true,
        }),
        (Some(cached), None) => Some(Reconciliation {
            working: cached.pipeline.clone(),
            original: cached.original_pipeline.clone(),
            is_updated: input.is_new || cached.pipeline != cached.original_pipeline,
            is_be_pipeline_updated: false,
            write_through: false,
            from_cache: true,
        }),
    }
}
