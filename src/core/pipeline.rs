//! Pipeline domain model

use crate::core::{stage::Stage, tree};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier carried by a pipeline that has never been saved
pub const NEW_PIPELINE_IDENTIFIER: &str = "-1";

/// A pipeline document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Stable key; only changed through an explicit rename or the first save
    pub identifier: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Free-form tags
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Ordered stage entries
    #[serde(default)]
    pub stages: Vec<StageNode>,

    /// Top-level keys the editor does not model (project/org identifiers,
    /// notification rules, flow control, variables, ...)
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// One entry of a stage list: a stage, or a group of stages running in parallel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StageNode {
    Stage { stage: Stage },
    Parallel { parallel: Vec<StageNode> },
}

impl StageNode {
    /// Wrap a stage
    pub fn stage(stage: Stage) -> Self {
        StageNode::Stage { stage }
    }

    /// Group stages into a parallel node
    pub fn parallel(stages: impl IntoIterator<Item = Stage>) -> Self {
        StageNode::Parallel {
            parallel: stages.into_iter().map(StageNode::stage).collect(),
        }
    }

    /// The stage, if this is a bare stage entry
    pub fn as_stage(&self) -> Option<&Stage> {
        match self {
            StageNode::Stage { stage } => Some(stage),
            StageNode::Parallel { .. } => None,
        }
    }

    /// Stages held by this entry, in order (one level of nesting)
    pub fn stages(&self) -> Vec<&Stage> {
        match self {
            StageNode::Stage { stage } => vec![stage],
            StageNode::Parallel { parallel } => parallel.iter().filter_map(StageNode::as_stage).collect(),
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, StageNode::Parallel { .. })
    }
}

impl<'de> Deserialize<'de> for StageNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct RawNode {
            #[serde(default)]
            stage: Option<Stage>,
            #[serde(default)]
            parallel: Option<Vec<StageNode>>,
        }

        let raw = RawNode::deserialize(deserializer)?;
        match (raw.stage, raw.parallel) {
            (Some(stage), None) => Ok(StageNode::Stage { stage }),
            (None, Some(parallel)) => Ok(StageNode::Parallel { parallel }),
            (Some(_), Some(_)) => Err(D::Error::custom(
                "stage entry has both `stage` and `parallel`",
            )),
            (None, None) => Err(D::Error::custom(
                "stage entry needs a `stage` or `parallel` key",
            )),
        }
    }
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            description: None,
            tags: BTreeMap::new(),
            stages: Vec::new(),
            other: Map::new(),
        }
    }

    /// The document a brand-new, unsaved pipeline starts from
    pub fn new_default() -> Self {
        Self::new(NEW_PIPELINE_IDENTIFIER, "")
    }

    /// Whether the pipeline has never been saved
    pub fn is_new(&self) -> bool {
        self.identifier == NEW_PIPELINE_IDENTIFIER
    }

    /// Get a stage by identifier, wherever it sits in the tree
    pub fn stage(&self, id: &str) -> Option<&Stage> {
        tree::find_stage(self, id).map(|found| found.stage)
    }

    /// Number of stages, counting parallel members individually
    pub fn stage_count(&self) -> usize {
        tree::flatten_stages(self).len()
    }
}

/// Where a pipeline document lives: account, org, project, pipeline, and the
/// git repo/branch when the document is backed by a file
///
/// Used as the local cache key and as the server address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineScope {
    pub account_id: String,
    pub org_identifier: String,
    pub project_identifier: String,
    pub pipeline_identifier: String,
    pub repo_identifier: String,
    pub branch: String,
}

impl PipelineScope {
    /// Scope for a pipeline outside version control
    pub fn new(
        account_id: impl Into<String>,
        org_identifier: impl Into<String>,
        project_identifier: impl Into<String>,
        pipeline_identifier: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            org_identifier: org_identifier.into(),
            project_identifier: project_identifier.into(),
            pipeline_identifier: pipeline_identifier.into(),
            repo_identifier: String::new(),
            branch: String::new(),
        }
    }

    /// Same scope, on a given repo and branch
    pub fn with_git(mut self, repo_identifier: impl Into<String>, branch: impl Into<String>) -> Self {
        self.repo_identifier = repo_identifier.into();
        self.branch = branch.into();
        self
    }

    /// Same scope, for another pipeline identifier
    pub fn with_pipeline(&self, pipeline_identifier: impl Into<String>) -> Self {
        Self {
            pipeline_identifier: pipeline_identifier.into(),
            ..self.clone()
        }
    }

    /// Whether the scope addresses an unsaved pipeline
    pub fn is_new(&self) -> bool {
        self.pipeline_identifier == NEW_PIPELINE_IDENTIFIER
    }

    pub fn is_git_backed(&self) -> bool {
        !self.repo_identifier.is_empty()
    }
}

impl fmt::Display for PipelineScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.account_id, self.org_identifier, self.project_identifier, self.pipeline_identifier
        )?;
        if self.is_git_backed() {
            write!(f, "@{}:{}", self.repo_identifier, self.branch)?;
        }
        Ok(())
    }
}
