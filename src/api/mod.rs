//! Server pipeline API

pub mod client;
pub mod response;

use crate::core::PipelineScope;
use async_trait::async_trait;
pub use client::{ApiClientConfig, HttpPipelineClient};
pub use response::{ApiError, RemotePipeline, SaveOutcome, SchemaError};

/// Trait for the pipeline service - allows for different implementations
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Read a pipeline; `None` when the server does not know it
    async fn get_pipeline(&self, scope: &PipelineScope) -> Result<Option<RemotePipeline>, ApiError>;

    /// Create a pipeline from a `{pipeline: ...}` YAML document
    async fn create_pipeline(&self, scope: &PipelineScope, yaml: &str) -> Result<SaveOutcome, ApiError>;

    /// Replace the pipeline addressed by `scope`
    async fn update_pipeline(&self, scope: &PipelineScope, yaml: &str) -> Result<SaveOutcome, ApiError>;
}
