//! Stage domain model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Name carried by a stage that was dropped on the canvas but never configured
pub const EMPTY_STAGE_NAME: &str = "EMPTYSTAGENAME";

/// A single stage in a pipeline
///
/// The kind-specific payload lives in [`StageSpec`], keyed by the YAML `type`
/// field. Stage-level keys the model does not know about (`when`,
/// `failureStrategies`, `variables`, ...) are kept in `other` so a document
/// survives a parse/serialize cycle unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStage", into = "RawStage")]
pub struct Stage {
    /// Identifier, unique across the whole pipeline
    pub identifier: String,

    /// Display name
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Kind-tagged payload
    pub spec: StageSpec,

    /// Unmodelled stage-level fields
    pub other: Map<String, Value>,
}

/// Kind of a stage, as written in the YAML `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageType {
    Deployment,
    #[serde(rename = "CI")]
    Build,
    Approval,
    Custom,
    Pipeline,
}

impl StageType {
    /// All built-in stage kinds
    pub const ALL: [StageType; 5] = [
        StageType::Deployment,
        StageType::Build,
        StageType::Approval,
        StageType::Custom,
        StageType::Pipeline,
    ];

    /// The YAML tag for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::Deployment => "Deployment",
            StageType::Build => "CI",
            StageType::Approval => "Approval",
            StageType::Custom => "Custom",
            StageType::Pipeline => "Pipeline",
        }
    }

    /// Parse a YAML tag
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific stage payload
///
/// Structural tree operations never look inside; only the reference
/// accessors below read the `useFromStage` fields.
#[derive(Debug, Clone, PartialEq)]
pub enum StageSpec {
    Deployment(DeploymentStageSpec),
    Build(BuildStageSpec),
    Approval(Value),
    Custom(Value),
    Pipeline(PipelineStageSpec),
}

/// Payload of a `Deployment` stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_config: Option<ServiceConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure: Option<DeploymentInfrastructure>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<Value>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Service section of a deployment stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_ref: Option<String>,

    /// Propagate the service from an earlier stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_from_stage: Option<UseFromStage>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Infrastructure section of a deployment stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfrastructure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_from_stage: Option<UseFromStage>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Reference to the stage a section is cloned from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseFromStage {
    pub stage: String,
}

/// Payload of a `CI` (build) stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_codebase: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure: Option<BuildInfrastructure>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<Value>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Infrastructure section of a build stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfrastructure {
    /// Reuse the build infrastructure of an earlier stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_from_stage: Option<String>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Payload of a `Pipeline` (chained pipeline) stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStageSpec {
    #[serde(default)]
    pub org: String,

    #[serde(default)]
    pub project: String,

    #[serde(default)]
    pub pipeline: String,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl StageSpec {
    /// An empty payload of the given kind
    pub fn empty(kind: StageType) -> Self {
        match kind {
            StageType::Deployment => StageSpec::Deployment(DeploymentStageSpec::default()),
            StageType::Build => StageSpec::Build(BuildStageSpec::default()),
            StageType::Approval => StageSpec::Approval(Value::Null),
            StageType::Custom => StageSpec::Custom(Value::Null),
            StageType::Pipeline => StageSpec::Pipeline(PipelineStageSpec::default()),
        }
    }

    pub fn stage_type(&self) -> StageType {
        match self {
            StageSpec::Deployment(_) => StageType::Deployment,
            StageSpec::Build(_) => StageType::Build,
            StageSpec::Approval(_) => StageType::Approval,
            StageSpec::Custom(_) => StageType::Custom,
            StageSpec::Pipeline(_) => StageType::Pipeline,
        }
    }

    /// Identifiers of the stages this payload clones configuration from
    pub fn references(&self) -> Vec<&str> {
        match self {
            StageSpec::Deployment(spec) => {
                let service = spec
                    .service_config
                    .as_ref()
                    .and_then(|s| s.use_from_stage.as_ref())
                    .map(|u| u.stage.as_str());
                let infra = spec
                    .infrastructure
                    .as_ref()
                    .and_then(|i| i.use_from_stage.as_ref())
                    .map(|u| u.stage.as_str());
                let mut refs: Vec<&str> = service.into_iter().chain(infra).collect();
                refs.dedup();
                refs
            }
            StageSpec::Build(spec) => spec
                .infrastructure
                .as_ref()
                .and_then(|i| i.use_from_stage.as_deref())
                .into_iter()
                .collect(),
            StageSpec::Approval(_) | StageSpec::Custom(_) | StageSpec::Pipeline(_) => Vec::new(),
        }
    }

    /// Whether the kind-specific required content is missing
    pub fn is_incomplete(&self) -> bool {
        match self {
            StageSpec::Deployment(spec) => {
                let has_service = spec
                    .service_config
                    .as_ref()
                    .is_some_and(|s| s.service_ref.is_some() || s.use_from_stage.is_some());
                !has_service || spec.execution.is_none()
            }
            StageSpec::Build(spec) => spec.execution.is_none(),
            StageSpec::Approval(value) | StageSpec::Custom(value) => {
                value.get("execution").map_or(true, Value::is_null)
            }
            StageSpec::Pipeline(spec) => spec.pipeline.is_empty(),
        }
    }

    fn into_value(self) -> Value {
        let value = match self {
            StageSpec::Deployment(spec) => serde_json::to_value(spec),
            StageSpec::Build(spec) => serde_json::to_value(spec),
            StageSpec::Approval(value) | StageSpec::Custom(value) => Ok(value),
            StageSpec::Pipeline(spec) => serde_json::to_value(spec),
        };
        value.unwrap_or(Value::Null)
    }

    fn from_value(kind: StageType, value: Value) -> Result<Self, serde_json::Error> {
        // `spec:` may be omitted for a freshly added stage
        let structured = if value.is_null() {
            Value::Object(Map::new())
        } else {
            value.clone()
        };

        Ok(match kind {
            StageType::Deployment => StageSpec::Deployment(serde_json::from_value(structured)?),
            StageType::Build => StageSpec::Build(serde_json::from_value(structured)?),
            StageType::Approval => StageSpec::Approval(value),
            StageType::Custom => StageSpec::Custom(value),
            StageType::Pipeline => StageSpec::Pipeline(serde_json::from_value(structured)?),
        })
    }
}

impl Stage {
    /// Create a stage with the given payload
    pub fn new(identifier: impl Into<String>, name: impl Into<String>, spec: StageSpec) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            description: None,
            spec,
            other: Map::new(),
        }
    }

    /// Create an unconfigured stage of the given kind
    pub fn placeholder(identifier: impl Into<String>, kind: StageType) -> Self {
        Self::new(identifier, EMPTY_STAGE_NAME, StageSpec::empty(kind))
    }

    pub fn stage_type(&self) -> StageType {
        self.spec.stage_type()
    }

    /// Whether this stage is an unconfigured drop target
    pub fn is_placeholder(&self) -> bool {
        self.name == EMPTY_STAGE_NAME
    }

    /// Whether the stage still needs configuration before it can run
    pub fn is_incomplete(&self) -> bool {
        self.is_placeholder() || self.spec.is_incomplete()
    }

    /// Identifiers of the stages this stage depends on
    pub fn references(&self) -> Vec<&str> {
        self.spec.references()
    }
}

/// Stage as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawStage {
    identifier: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "type")]
    stage_type: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    spec: Value,
    #[serde(flatten)]
    other: Map<String, Value>,
}

/// Error converting a wire stage into the typed model
#[derive(Debug, thiserror::Error)]
pub enum StageParseError {
    #[error("stage '{identifier}' has unsupported type '{stage_type}'")]
    UnsupportedType { identifier: String, stage_type: String },

    #[error("stage '{identifier}' has an invalid {stage_type} spec: {source}")]
    InvalidSpec {
        identifier: String,
        stage_type: StageType,
        source: serde_json::Error,
    },
}

impl TryFrom<RawStage> for Stage {
    type Error = StageParseError;

    fn try_from(raw: RawStage) -> Result<Self, Self::Error> {
        let kind = StageType::parse(&raw.stage_type).ok_or_else(|| StageParseError::UnsupportedType {
            identifier: raw.identifier.clone(),
            stage_type: raw.stage_type.clone(),
        })?;

        let spec = StageSpec::from_value(kind, raw.spec).map_err(|source| StageParseError::InvalidSpec {
            identifier: raw.identifier.clone(),
            stage_type: kind,
            source,
        })?;

        Ok(Stage {
            identifier: raw.identifier,
            name: raw.name,
            description: raw.description,
            spec,
            other: raw.other,
        })
    }
}

impl From<Stage> for RawStage {
    fn from(stage: Stage) -> Self {
        RawStage {
            identifier: stage.identifier,
            name: stage.name,
            description: stage.description,
            stage_type: stage.spec.stage_type().as_str().to_string(),
            spec: stage.spec.into_value(),
            other: stage.other,
        }
    }
}

/// Display metadata for one stage kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageKindMetadata {
    pub display_name: String,
    pub icon: String,
    pub color: String,
    pub is_approval: bool,
}

impl StageKindMetadata {
    fn new(display_name: &str, icon: &str, color: &str, is_approval: bool) -> Self {
        Self {
            display_name: display_name.to_string(),
            icon: icon.to_string(),
            color: color.to_string(),
            is_approval,
        }
    }
}

/// Lookup from stage kind to display metadata
#[derive(Debug, Clone)]
pub struct StageKindRegistry {
    kinds: HashMap<StageType, StageKindMetadata>,
}

impl StageKindRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    /// Create a registry with the built-in stage kinds
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(StageType::Deployment, StageKindMetadata::new("Deploy", "deployment", "#4dc952", false));
        registry.register(StageType::Build, StageKindMetadata::new("Build", "ci-main", "#3f9ce1", false));
        registry.register(StageType::Approval, StageKindMetadata::new("Approval", "approval-stage", "#ff8800", true));
        registry.register(StageType::Custom, StageKindMetadata::new("Custom Stage", "custom-stage", "#6938c0", false));
        registry.register(StageType::Pipeline, StageKindMetadata::new("Pipeline", "pipeline", "#0278d5", false));
        registry
    }

    /// Register or replace the metadata of a kind
    pub fn register(&mut self, kind: StageType, metadata: StageKindMetadata) {
        self.kinds.insert(kind, metadata);
    }

    pub fn get(&self, kind: StageType) -> Option<&StageKindMetadata> {
        self.kinds.get(&kind)
    }

    pub fn is_approval(&self, kind: StageType) -> bool {
        self.get(kind).is_some_and(|m| m.is_approval)
    }
}

impl Default for StageKindRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
