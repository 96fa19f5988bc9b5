// ==============================================================================
// models.rs - API Data Models
// ==============================================================================
// Description: Inbound upload, processing service wire types, and response
//              envelopes for the augmentation gateway
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Content type assumed when the client doesn't send a usable one
pub const DEFAULT_ARCHIVE_TYPE: &str = "application/zip";

/// Archive as received from the client (multipart `zipFile` field)
#[derive(Debug, Clone)]
pub struct Archive {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

impl Archive {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Raw upload as collected from the multipart form, before validation
#[derive(Debug, Default)]
pub struct UploadRequest {
    pub archive: Option<Archive>,
    pub k_neighbour: Option<String>,
    pub target_ratio: Option<String>,
    pub random_state: Option<String>,
}

/// Validated numeric parameters handed to the processing service
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessingParameters {
    pub k_neighbours: u32,
    /// `None` lets the processing service choose
    pub target_ratio: Option<f64>,
    pub random_state: i64,
}

/// Output of the validator: everything the pipeline needs, nothing else
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub parameters: ProcessingParameters,
    pub archive: Archive,
}

/// `POST /params` body
#[derive(Debug, Serialize)]
pub struct ParamsPayload {
    pub data: ParamsData,
}

#[derive(Debug, Serialize)]
pub struct ParamsData {
    pub kneighbors: u32,
    pub targetratio: Option<f64>,
    pub randomstate: i64,
}

impl From<&ProcessingParameters> for ParamsPayload {
    fn from(params: &ProcessingParameters) -> Self {
        Self {
            data: ParamsData {
                kneighbors: params.k_neighbours,
                targetratio: params.target_ratio,
                randomstate: params.random_state,
            },
        }
    }
}

/// One ingested asset. Only `id` is interpreted; the rest is kept as-is.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// `POST /upload/zip` response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetManifest {
    #[serde(default)]
    pub count: Option<usize>,
    pub assets: Vec<AssetDescriptor>,
}

/// Ways a manifest can break the contract the relay depends on
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestViolation {
    #[error("Invalid response from processing server (/upload/zip)")]
    Empty,

    #[error("Missing asset id from processing server")]
    MissingId { index: usize },

    #[error("Duplicate asset id from processing server")]
    DuplicateId(String),
}

impl AssetManifest {
    /// Asset ids in manifest order.
    ///
    /// Fails if the manifest is empty, any descriptor has no (or an empty)
    /// id, or an id repeats.
    pub fn asset_ids(&self) -> Result<Vec<String>, ManifestViolation> {
        if self.assets.is_empty() {
            return Err(ManifestViolation::Empty);
        }

        let mut seen = HashSet::with_capacity(self.assets.len());
        let mut ids = Vec::with_capacity(self.assets.len());

        for (index, asset) in self.assets.iter().enumerate() {
            let id = match asset.id.as_deref() {
                Some(id) if !id.is_empty() => id,
                _ => return Err(ManifestViolation::MissingId { index }),
            };
            if !seen.insert(id) {
                return Err(ManifestViolation::DuplicateId(id.to_string()));
            }
            ids.push(id.to_string());
        }

        Ok(ids)
    }
}

/// Augmentation options sent with every `/augment/smote` call
#[derive(Debug, Clone, Default, Serialize)]
pub struct AugmentOptions {
    pub horizontal_flip: bool,
    pub rotate_deg: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ImageRef {
    pub asset_id: String,
}

/// `POST /augment/smote` body
#[derive(Debug, Serialize)]
pub struct AugmentRequest {
    pub images: Vec<ImageRef>,
    pub options: AugmentOptions,
}

impl AugmentRequest {
    pub fn new(asset_ids: &[String], options: &AugmentOptions) -> Self {
        Self {
            images: asset_ids
                .iter()
                .map(|id| ImageRef { asset_id: id.clone() })
                .collect(),
            options: options.clone(),
        }
    }
}

/// Error body returned by the processing service (FastAPI style)
#[derive(Debug, Default, Deserialize)]
pub struct DownstreamErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<serde_json::Value>,
}

impl DownstreamErrorBody {
    /// First string-valued diagnostic, `detail` before `message`
    pub fn diagnostic(&self) -> Option<String> {
        [&self.detail, &self.message]
            .into_iter()
            .flatten()
            .find_map(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.trim().is_empty())
    }
}

/// API information response
#[derive(Debug, Serialize)]
pub struct ApiInfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub processing_server: bool,
}

/// Error envelope returned to the client
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
