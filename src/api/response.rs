//! Pipeline service response types

use crate::core::GitDetails;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for pipeline service calls
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Request aborted")]
    Aborted,
}

impl ApiError {
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        ApiError::Api {
            status,
            message: message.into(),
        }
    }
}

/// A pipeline as returned by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePipeline {
    /// The `{pipeline: ...}` YAML document
    pub yaml_pipeline: String,

    #[serde(default)]
    pub git_details: Option<GitDetails>,
}

/// One schema violation reported by the server on save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaError {
    /// Fully qualified path of the offending field
    pub fqn: String,
    pub message: String,
    #[serde(default)]
    pub stage_identifier: Option<String>,
    #[serde(default)]
    pub step_identifier: Option<String>,
}

/// Result of a create/update call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Accepted; carries the identifier the server stored it under
    Saved { identifier: String },
    /// Rejected by schema validation
    Invalid(Vec<SchemaError>),
}

/// JSON envelope wrapping every service response
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope<T> {
    #[serde(default)]
    pub status: Option<String>,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    #[serde(default)]
    pub schema_errors: Vec<SchemaError>,
}

/// Payload of a successful save
#[derive(Debug, Clone, Deserialize)]
pub struct SavedPipeline {
    pub identifier: String,
}

/// Interpret the body of a GET response; 404 means the pipeline does not exist
pub fn parse_get_response(status: u16, body: &str) -> Result<Option<RemotePipeline>, ApiError> {
    if status == 404 {
        return Ok(None);
    }

    let envelope: ResponseEnvelope<RemotePipeline> = parse_envelope(status, body)?;
    if !(200..300).contains(&status) {
        return Err(ApiError::api_error(status, error_message(&envelope, body)));
    }

    envelope
        .data
        .map(Some)
        .ok_or_else(|| ApiError::Parse("Response has no data".to_string()))
}

/// Interpret the body of a create/update response
pub fn parse_save_response(status: u16, body: &str) -> Result<SaveOutcome, ApiError> {
    let envelope: ResponseEnvelope<SavedPipeline> = parse_envelope(status, body)?;

    if let Some(metadata) = &envelope.metadata {
        if !metadata.schema_errors.is_empty() {
            return Ok(SaveOutcome::Invalid(metadata.schema_errors.clone()));
        }
    }

    if !(200..300).contains(&status) {
        return Err(ApiError::api_error(status, error_message(&envelope, body)));
    }

    envelope
        .data
        .map(|saved| SaveOutcome::Saved {
            identifier: saved.identifier,
        })
        .ok_or_else(|| ApiError::Parse("Response has no data".to_string()))
}

fn parse_envelope<T: serde::de::DeserializeOwned>(status: u16, body: &str) -> Result<ResponseEnvelope<T>, ApiError> {
    match serde_json::from_str(body) {
        Ok(envelope) => Ok(envelope),
        // Error pages from proxies are rarely JSON
        Err(_) if !(200..300).contains(&status) => Err(ApiError::api_error(status, body.trim())),
        Err(e) => Err(ApiError::Parse(format!("Failed to parse JSON response: {}", e))),
    }
}

fn error_message<T>(envelope: &ResponseEnvelope<T>, body: &str) -> String {
    envelope.message.clone().unwrap_or_else(|| body.trim().to_string())
}
