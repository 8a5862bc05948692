//! CLI command definitions

use crate::api::ApiClientConfig;
use crate::core::PipelineScope;
use clap::Args;
use std::path::PathBuf;

/// Validate a pipeline document
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Print the stage tree of a pipeline document
#[derive(Debug, Args, Clone)]
pub struct ShowCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,
}

/// Load a pipeline through the local cache and report its state
#[derive(Debug, Args, Clone)]
pub struct StatusCommand {
    #[command(flatten)]
    pub scope: ScopeArgs,

    #[command(flatten)]
    pub server: ServerArgs,

    #[command(flatten)]
    pub cache: CacheArgs,

    /// Read the server even when a cached copy exists
    #[arg(long)]
    pub refresh: bool,
}

/// Drop the locally cached working copy of a pipeline
#[derive(Debug, Args, Clone)]
pub struct DiscardCommand {
    #[command(flatten)]
    pub scope: ScopeArgs,

    #[command(flatten)]
    pub cache: CacheArgs,
}

/// Address of a pipeline
#[derive(Debug, Args, Clone)]
pub struct ScopeArgs {
    /// Account identifier
    #[arg(long)]
    pub account: String,

    /// Organization identifier
    #[arg(long)]
    pub org: String,

    /// Project identifier
    #[arg(long)]
    pub project: String,

    /// Pipeline identifier ("-1" for an unsaved new pipeline)
    #[arg(long, allow_hyphen_values = true)]
    pub pipeline: String,

    /// Git repository, for pipelines stored in git
    #[arg(long, default_value = "")]
    pub repo: String,

    /// Git branch, for pipelines stored in git
    #[arg(long, default_value = "")]
    pub branch: String,
}

impl ScopeArgs {
    pub fn to_scope(&self) -> PipelineScope {
        PipelineScope::new(&self.account, &self.org, &self.project, &self.pipeline)
            .with_git(&self.repo, &self.branch)
    }
}

/// Pipeline service connection
#[derive(Debug, Args, Clone)]
pub struct ServerArgs {
    /// Base URL of the pipeline service
    #[arg(long, env = "PIPELINE_STUDIO_SERVER", default_value = "http://localhost:7090/api")]
    pub server: String,

    /// API key sent with every request
    #[arg(long, env = "PIPELINE_STUDIO_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

impl ServerArgs {
    pub fn to_config(&self) -> ApiClientConfig {
        let config = ApiClientConfig::new()
            .with_base_url(&self.server)
            .with_timeout(self.timeout);
        match &self.api_key {
            Some(key) => config.with_api_key(key),
            None => config,
        }
    }
}

/// Local cache location
#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    /// Path of the cache database (defaults to the user data directory)
    #[arg(long, env = "PIPELINE_STUDIO_DB")]
    pub db: Option<PathBuf>,
}
