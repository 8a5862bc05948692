//! Pipeline documents in their YAML form

use crate::core::{
    pipeline::{Pipeline, StageNode},
    tree,
};
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

/// The `{pipeline: ...}` envelope exchanged with the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDocument {
    pub pipeline: Pipeline,
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z_][0-9a-zA-Z_$]{0,127}$").expect("static pattern"))
}

/// Whether a string is usable as a pipeline or stage identifier
pub fn is_valid_identifier(identifier: &str) -> bool {
    identifier_pattern().is_match(identifier)
}

impl PipelineDocument {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Load and validate a pipeline document from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a pipeline document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let document = Self::parse(yaml)?;
        document.validate()?;
        Ok(document)
    }

    /// Parse without structural validation
    ///
    /// Used for documents coming from the server or the local cache, which
    /// the editor must open even when they are not yet valid.
    pub fn parse(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the structure of the document
    pub fn validate(&self) -> Result<()> {
        let pipeline = &self.pipeline;

        if pipeline.name.trim().is_empty() {
            anyhow::bail!("Pipeline name is required");
        }

        if !pipeline.is_new() && !is_valid_identifier(&pipeline.identifier) {
            anyhow::bail!("Invalid pipeline identifier: '{}'", pipeline.identifier);
        }

        // Only one level of parallel nesting is supported
        for node in &pipeline.stages {
            if let StageNode::Parallel { parallel } = node {
                if parallel.iter().any(StageNode::is_parallel) {
                    anyhow::bail!("Nested parallel groups are not supported");
                }
                if parallel.is_empty() {
                    anyhow::bail!("Empty parallel group");
                }
            }
        }

        // Stage identifiers must be well-formed and unique across the whole tree
        let mut seen_ids = HashSet::new();
        for stage in tree::flatten_stages(pipeline) {
            if !is_valid_identifier(&stage.identifier) {
                anyhow::bail!("Invalid stage identifier: '{}'", stage.identifier);
            }
            if !seen_ids.insert(stage.identifier.as_str()) {
                anyhow::bail!("Duplicate stage identifier: {}", stage.identifier);
            }
        }

        // References must point at existing stages
        for stage in tree::flatten_stages(pipeline) {
            for reference in stage.references() {
                if !seen_ids.contains(reference) {
                    anyhow::bail!(
                        "Stage '{}' takes configuration from non-existent stage '{}'",
                        stage.identifier,
                        reference
                    );
                }
            }
        }

        tree::validate_stage_order(pipeline)?;

        Ok(())
    }

    pub fn into_pipeline(self) -> Pipeline {
        self.pipeline
    }
}
