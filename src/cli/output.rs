//! CLI output formatting

use crate::core::{tree, Pipeline, StageKindRegistry, StageNode, StoreFailure, StoreStatus};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");

/// Create a spinner for a long-running step
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.green} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a store status for display
pub fn format_status(status: &StoreStatus) -> String {
    match status {
        StoreStatus::Uninitialized => style("UNINITIALIZED").dim().to_string(),
        StoreStatus::DbInitializing => style("OPENING CACHE").yellow().to_string(),
        StoreStatus::Fetching => style("FETCHING").yellow().to_string(),
        StoreStatus::Ready => style("READY").green().to_string(),
        StoreStatus::Updating => style("UPDATING").yellow().to_string(),
        StoreStatus::Error(StoreFailure::Db(reason)) => style(format!("CACHE ERROR: {}", reason)).red().to_string(),
        StoreStatus::Error(StoreFailure::Fetch(reason)) => style(format!("FETCH ERROR: {}", reason)).red().to_string(),
    }
}

/// Yes/no flag, highlighted when set
pub fn format_flag(value: bool) -> String {
    if value {
        style("yes").yellow().to_string()
    } else {
        style("no").dim().to_string()
    }
}

/// One line per stage: path, identifier, kind and markers
pub fn format_stage_tree(pipeline: &Pipeline, registry: &StageKindRegistry) -> Vec<String> {
    let mut lines = Vec::new();

    for node in &pipeline.stages {
        let nested = matches!(node, StageNode::Parallel { .. });
        if nested {
            lines.push(format!("  {}", style("parallel").dim()));
        }

        for stage in node.stages() {
            let indent = if nested { "    " } else { "  " };
            let kind = registry
                .get(stage.stage_type())
                .map(|meta| meta.display_name.clone())
                .unwrap_or_else(|| stage.stage_type().to_string());
            let path = tree::path_to_stage(pipeline, &stage.identifier, "pipeline").unwrap_or_default();

            let mut line = format!(
                "{}{} {} [{}] {}",
                indent,
                style(&stage.identifier).bold(),
                style(&stage.name).cyan(),
                kind,
                style(path).dim()
            );
            if stage.is_incomplete() {
                line.push_str(&format!(" {}", style("incomplete").yellow()));
            }
            for reference in stage.references() {
                line.push_str(&format!(" {}", style(format!("<- {}", reference)).dim()));
            }
            lines.push(line);
        }
    }

    lines
}
