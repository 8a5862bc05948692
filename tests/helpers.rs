//! Test utilities for pipeline-studio
#![allow(dead_code)]

use async_trait::async_trait;
use pipeline_studio::api::{ApiError, PipelineApi, RemotePipeline, SaveOutcome, SchemaError};
use pipeline_studio::core::stage::{DeploymentStageSpec, ServiceConfig, UseFromStage};
use pipeline_studio::core::{
    tree, GitDetails, Pipeline, PipelineDocument, PipelineScope, Stage, StageNode, StageSpec, StageType,
};
use pipeline_studio::persistence::{CacheEntry, InMemoryCache, LocalCache};
use pipeline_studio::studio::{FetchOptions, PipelineStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-process stand-in for the pipeline service
///
/// Stores YAML bodies by scope. Created pipelines get an identifier derived
/// from their name, lowercased (`"Deploy Service"` becomes `deploy_service`).
#[derive(Default)]
pub struct MockPipelineApi {
    pipelines: Mutex<HashMap<PipelineScope, RemotePipeline>>,
    schema_errors: Mutex<Option<Vec<SchemaError>>>,
    fail_reads: AtomicBool,
    read_delay: Mutex<Option<Duration>>,
    get_calls: AtomicUsize,
    save_calls: AtomicUsize,
}

impl MockPipelineApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a pipeline as the server copy for a scope
    pub fn put_pipeline(&self, scope: &PipelineScope, pipeline: &Pipeline) {
        self.put_pipeline_with_git(scope, pipeline, None);
    }

    pub fn put_pipeline_with_git(&self, scope: &PipelineScope, pipeline: &Pipeline, git_details: Option<GitDetails>) {
        let yaml_pipeline = PipelineDocument::new(pipeline.clone()).to_yaml().unwrap();
        self.pipelines.lock().unwrap().insert(
            scope.clone(),
            RemotePipeline {
                yaml_pipeline,
                git_details,
            },
        );
    }

    /// Server copy for a scope, parsed
    pub fn stored(&self, scope: &PipelineScope) -> Option<Pipeline> {
        self.pipelines
            .lock()
            .unwrap()
            .get(scope)
            .map(|remote| PipelineDocument::parse(&remote.yaml_pipeline).unwrap().into_pipeline())
    }

    /// Make every save fail schema validation
    pub fn reject_saves_with(&self, errors: Vec<SchemaError>) {
        *self.schema_errors.lock().unwrap() = Some(errors);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    fn store_yaml(&self, scope: &PipelineScope, yaml: &str, identifier: &str) -> Result<SaveOutcome, ApiError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(errors) = self.schema_errors.lock().unwrap().clone() {
            return Ok(SaveOutcome::Invalid(errors));
        }

        let mut pipeline = PipelineDocument::parse(yaml)
            .map_err(|e| ApiError::api_error(400, e.to_string()))?
            .into_pipeline();
        pipeline.identifier = identifier.to_string();
        self.put_pipeline(&scope.with_pipeline(identifier), &pipeline);

        Ok(SaveOutcome::Saved {
            identifier: identifier.to_string(),
        })
    }
}

#[async_trait]
impl PipelineApi for MockPipelineApi {
    async fn get_pipeline(&self, scope: &PipelineScope) -> Result<Option<RemotePipeline>, ApiError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ApiError::api_error(503, "service unavailable"));
        }

        Ok(self.pipelines.lock().unwrap().get(scope).cloned())
    }

    async fn create_pipeline(&self, scope: &PipelineScope, yaml: &str) -> Result<SaveOutcome, ApiError> {
        let name = PipelineDocument::parse(yaml)
            .map_err(|e| ApiError::api_error(400, e.to_string()))?
            .pipeline
            .name;
        let identifier = tree::identifier_from_name(&name).to_lowercase();
        self.store_yaml(scope, yaml, &identifier)
    }

    async fn update_pipeline(&self, scope: &PipelineScope, yaml: &str) -> Result<SaveOutcome, ApiError> {
        let identifier = PipelineDocument::parse(yaml)
            .map_err(|e| ApiError::api_error(400, e.to_string()))?
            .pipeline
            .identifier;
        self.store_yaml(scope, yaml, &identifier)
    }
}

/// Scope in the test account/org/project
pub fn scope(pipeline_identifier: &str) -> PipelineScope {
    PipelineScope::new("acct", "org", "proj", pipeline_identifier)
}

/// A stage of the given kind with an empty payload
pub fn stage(id: &str, kind: StageType) -> Stage {
    Stage::new(id, id.to_uppercase(), StageSpec::empty(kind))
}

pub fn custom_stage(id: &str) -> Stage {
    stage(id, StageType::Custom)
}

/// A deployment stage taking its service from `source`
pub fn cloned_from(id: &str, source: &str) -> Stage {
    Stage::new(
        id,
        id.to_uppercase(),
        StageSpec::Deployment(DeploymentStageSpec {
            service_config: Some(ServiceConfig {
                use_from_stage: Some(UseFromStage {
                    stage: source.to_string(),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
    )
}

pub fn pipeline_with(identifier: &str, name: &str, stages: Vec<StageNode>) -> Pipeline {
    let mut pipeline = Pipeline::new(identifier, name);
    pipeline.stages = stages;
    pipeline
}

/// `[A, B, parallel[C, D]]`
pub fn sample_pipeline(identifier: &str) -> Pipeline {
    pipeline_with(
        identifier,
        "Sample",
        vec![
            StageNode::stage(custom_stage("A")),
            StageNode::stage(custom_stage("B")),
            StageNode::parallel(vec![custom_stage("C"), custom_stage("D")]),
        ],
    )
}

/// Compact rendering of the stage list: `A B [C D]`
pub fn layout(pipeline: &Pipeline) -> String {
    pipeline
        .stages
        .iter()
        .map(|node| match node {
            StageNode::Stage { stage } => stage.identifier.clone(),
            StageNode::Parallel { .. } => format!(
                "[{}]",
                node.stages()
                    .iter()
                    .map(|stage| stage.identifier.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cache entry as written by an earlier session
pub async fn seed_cache(cache: &InMemoryCache, scope: &PipelineScope, working: &Pipeline, original: &Pipeline) {
    cache
        .put(&CacheEntry::new(scope.clone(), working.clone(), original.clone()))
        .await
        .unwrap();
}

/// Store with its cache initialized, not yet fetched
pub async fn new_store(
    api: &Arc<MockPipelineApi>,
    cache: &Arc<InMemoryCache>,
    scope: PipelineScope,
) -> PipelineStore<MockPipelineApi> {
    let store = PipelineStore::new(api.clone(), cache.clone(), scope);
    store.initialize().await.unwrap();
    store
}

/// Store with the document loaded
pub async fn loaded_store(
    api: &Arc<MockPipelineApi>,
    cache: &Arc<InMemoryCache>,
    scope: PipelineScope,
) -> PipelineStore<MockPipelineApi> {
    let store = new_store(api, cache, scope).await;
    store.fetch(FetchOptions::default()).await.unwrap();
    store
}
