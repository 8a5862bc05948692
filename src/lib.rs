//! pipeline-studio - document core of a visual CI/CD pipeline editor

pub mod api;
pub mod cli;
pub mod core;
pub mod diagram;
pub mod persistence;
pub mod studio;

// Re-export commonly used types
pub use api::{ApiClientConfig, ApiError, HttpPipelineClient, PipelineApi, RemotePipeline, SaveOutcome, SchemaError};
pub use core::{InsertPosition, Pipeline, PipelineDocument, PipelineScope, Stage, StageNode, StageType, TreeError};
pub use persistence::{CacheEntry, CacheError, InMemoryCache, LocalCache};
pub use studio::{FetchOptions, PipelineStore, PipelineStudioState, SaveResult, StudioError};
