//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{DiscardCommand, ShowCommand, StatusCommand, ValidateCommand};
use std::ffi::OsString;

/// Pipeline document tool
#[derive(Debug, Parser, Clone)]
#[command(name = "pipeline-studio")]
#[command(version)]
#[command(about = "Inspect pipeline documents and their locally cached working copies", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Validate a pipeline YAML file
    Validate(ValidateCommand),

    /// Print the stage tree of a pipeline YAML file
    Show(ShowCommand),

    /// Load a pipeline and report working-copy status
    Status(StatusCommand),

    /// Discard the cached working copy of a pipeline
    Discard(DiscardCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
