//! Core domain models for pipeline documents
//!
//! This module defines the pipeline/stage tree, the pure editing operations
//! over it, the YAML envelope, and the editor state types shared with the
//! store.

pub mod config;
pub mod pipeline;
pub mod stage;
pub mod state;
pub mod tree;

pub use config::PipelineDocument;
pub use pipeline::*;
pub use stage::*;
pub use state::*;
pub use tree::{InsertPosition, StageRef, TreeError};
