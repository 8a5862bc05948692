//! HTTP client for the pipeline service

use crate::api::response::{parse_get_response, parse_save_response, ApiError, RemotePipeline, SaveOutcome};
use crate::api::PipelineApi;
use crate::core::PipelineScope;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "x-api-key";

/// Configuration for the pipeline service client
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL of the service, e.g. `http://localhost:7090/api`
    pub base_url: String,

    /// Timeout for requests in seconds
    pub timeout_secs: u64,

    /// Sent in the `x-api-key` header when set
    pub api_key: Option<String>,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7090/api".to_string(),
            timeout_secs: 30,
            api_key: None,
        }
    }
}

impl ApiClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// [`PipelineApi`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpPipelineClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpPipelineClient {
    pub fn new(config: ApiClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn pipeline_url(&self, identifier: &str) -> String {
        format!("{}/pipelines/{}", self.base_url, identifier)
    }

    /// Scope query parameters; repo and branch only for git-backed pipelines
    fn scope_query(scope: &PipelineScope) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("accountIdentifier", scope.account_id.clone()),
            ("orgIdentifier", scope.org_identifier.clone()),
            ("projectIdentifier", scope.project_identifier.clone()),
        ];
        if !scope.repo_identifier.is_empty() {
            query.push(("repoIdentifier", scope.repo_identifier.clone()));
        }
        if !scope.branch.is_empty() {
            query.push(("branch", scope.branch.clone()));
        }
        query
    }

    fn request(&self, builder: reqwest::RequestBuilder, scope: &PipelineScope) -> reqwest::RequestBuilder {
        let builder = builder.query(&Self::scope_query(scope));
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn send_yaml(&self, builder: reqwest::RequestBuilder, scope: &PipelineScope, yaml: &str) -> Result<SaveOutcome, ApiError> {
        let response = self
            .request(builder, scope)
            .header(reqwest::header::CONTENT_TYPE, "application/yaml")
            .body(yaml.to_string())
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_save_response(status, &body)
    }
}

#[async_trait]
impl PipelineApi for HttpPipelineClient {
    async fn get_pipeline(&self, scope: &PipelineScope) -> Result<Option<RemotePipeline>, ApiError> {
        let url = self.pipeline_url(&scope.pipeline_identifier);
        debug!("GET {}", url);

        let response = self.request(self.client.get(&url), scope).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_get_response(status, &body)
    }

    async fn create_pipeline(&self, scope: &PipelineScope, yaml: &str) -> Result<SaveOutcome, ApiError> {
        let url = format!("{}/pipelines", self.base_url);
        debug!("POST {}", url);
        self.send_yaml(self.client.post(&url), scope, yaml).await
    }

    async fn update_pipeline(&self, scope: &PipelineScope, yaml: &str) -> Result<SaveOutcome, ApiError> {
        let url = self.pipeline_url(&scope.pipeline_identifier);
        debug!("PUT {}", url);
        self.send_yaml(self.client.put(&url), scope, yaml).await
    }
}
