use anyhow::{Context, Result};
use pipeline_studio::cli::commands::{CacheArgs, DiscardCommand, ShowCommand, StatusCommand, ValidateCommand};
use pipeline_studio::cli::output::*;
use pipeline_studio::cli::{Cli, Command};
use pipeline_studio::core::{tree, PipelineDocument, StageKindRegistry};
use pipeline_studio::persistence::{delete_pipeline_cache, LocalCache};
use pipeline_studio::studio::{FetchOptions, PipelineStore};
use pipeline_studio::HttpPipelineClient;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("PIPELINE_STUDIO_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::Show(cmd) => show_pipeline(cmd)?,
        Command::Status(cmd) => show_status(cmd).await?,
        Command::Discard(cmd) => discard_cache(cmd).await?,
    }

    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    match PipelineDocument::from_file(&cmd.file) {
        Ok(document) => {
            let pipeline = &document.pipeline;
            println!("{} Pipeline document is valid!", CHECK);
            println!("  Name: {}", style(&pipeline.name).bold());
            println!("  Identifier: {}", style(&pipeline.identifier).cyan());
            println!("  Stages: {}", style(pipeline.stage_count()).cyan());

            let incomplete: Vec<_> = tree::flatten_stages(pipeline)
                .into_iter()
                .filter(|stage| stage.is_incomplete())
                .map(|stage| stage.identifier.as_str())
                .collect();
            if !incomplete.is_empty() {
                println!("{} Incomplete stages: {}", WARN, style(incomplete.join(", ")).yellow());
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&document)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

fn show_pipeline(cmd: &ShowCommand) -> Result<()> {
    let document = PipelineDocument::from_file(&cmd.file).context("Failed to load pipeline document")?;
    let pipeline = &document.pipeline;
    let registry = StageKindRegistry::with_defaults();

    println!("{} {} ({})", INFO, style(&pipeline.name).bold(), style(&pipeline.identifier).dim());
    for line in format_stage_tree(pipeline, &registry) {
        println!("{}", line);
    }

    for stage in tree::flatten_stages(pipeline) {
        let dependents = tree::dependent_stages(pipeline, &stage.identifier);
        if !dependents.is_empty() {
            println!(
                "  {} {} is used by {}",
                INFO,
                style(&stage.identifier).bold(),
                style(dependents.join(", ")).cyan()
            );
        }
    }

    Ok(())
}

fn open_cache(args: &CacheArgs) -> Result<Arc<dyn LocalCache>> {
    #[cfg(feature = "sqlite")]
    {
        let cache = match &args.db {
            Some(path) => pipeline_studio::persistence::SqliteCache::new(path),
            None => pipeline_studio::persistence::SqliteCache::with_default_path()?,
        };
        Ok(Arc::new(cache))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        if args.db.is_some() {
            tracing::warn!("Built without sqlite; using an in-memory cache");
        }
        Ok(Arc::new(pipeline_studio::InMemoryCache::new()))
    }
}

async fn show_status(cmd: &StatusCommand) -> Result<()> {
    let scope = cmd.scope.to_scope();
    let cache = open_cache(&cmd.cache)?;
    let client = HttpPipelineClient::new(cmd.server.to_config())?;
    let store = PipelineStore::new(Arc::new(client), cache, scope.clone());

    let spinner = create_spinner(&format!("Loading {}", scope));
    let loaded = async {
        store.initialize().await?;
        store
            .fetch(FetchOptions {
                force_fetch: cmd.refresh,
                force_update: false,
            })
            .await
    }
    .await;
    spinner.finish_and_clear();

    let state = store.state().await;
    if let Err(e) = loaded {
        println!("{} Failed to load {}", CROSS, style(&scope).bold());
        println!("  Status: {}", format_status(&state.status));
        println!("  {}", style(e).red());
        std::process::exit(1);
    }

    println!("{} {}", CHECK, style(&scope).bold());
    println!("  Status: {}", format_status(&state.status));
    println!("  Name: {}", style(&state.pipeline.name).bold());
    println!("  Stages: {}", style(state.pipeline.stage_count()).cyan());
    println!("  Unsaved changes: {}", format_flag(state.is_updated));
    println!("  Changed on server: {}", format_flag(state.is_be_pipeline_updated));

    if let Some(git) = &state.git_details {
        if let Some(path) = &git.file_path {
            println!("  File: {}", style(path).dim());
        }
    }
    if let Some(placeholder) = tree::find_placeholder_stage(&state.pipeline) {
        println!("{} Unconfigured stage: {}", WARN, style(&placeholder.identifier).yellow());
    }
    if let Some(fetch_error) = &state.fetch_error {
        println!("{} Server unavailable, showing cached copy: {}", WARN, style(fetch_error).yellow());
    }

    Ok(())
}

async fn discard_cache(cmd: &DiscardCommand) -> Result<()> {
    let scope = cmd.scope.to_scope();
    let cache = open_cache(&cmd.cache)?;

    cache.init().await.context("Failed to open local cache")?;
    match cache.get(&scope).await? {
        Some(entry) if entry.is_updated => {
            println!("{} Discarding unsaved changes to {}", WARN, style(&entry.pipeline.name).bold());
        }
        Some(_) => {}
        None => {
            println!("{} Nothing cached for {}", INFO, style(&scope).bold());
            return Ok(());
        }
    }

    delete_pipeline_cache(cache.as_ref(), &scope).await?;
    println!("{} Discarded cached copy of {}", CHECK, style(&scope).bold());
    Ok(())
}
