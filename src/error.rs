// ==============================================================================
// error.rs - Upload Processing Errors
// ==============================================================================
// Description: Error taxonomy for the upload pipeline and its mapping onto
//              the `{message}` JSON envelope
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::{ErrorResponse, ManifestViolation};
use crate::validator::ValidationError;

/// Processing service call a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Handoff,
    Ingestion,
    Augmentation,
}

impl Phase {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Phase::Handoff => "/params",
            Phase::Ingestion => "/upload/zip",
            Phase::Augmentation => "/augment/smote",
        }
    }

    /// Message used when the processing service gives no usable detail
    pub fn fallback_message(&self) -> &'static str {
        match self {
            Phase::Handoff => "Failed to send parameters to processing server",
            Phase::Ingestion => "Failed to send zip file to processing server",
            Phase::Augmentation => "Failed to augment dataset",
        }
    }

    fn rejected_status(&self) -> StatusCode {
        match self {
            Phase::Handoff | Phase::Ingestion => StatusCode::INTERNAL_SERVER_ERROR,
            Phase::Augmentation => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Every way a processing request can end before the relay starts.
///
/// Failures after the relay has started are not represented here: the
/// response is already committed and the connection is aborted instead.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Malformed multipart body
    #[error("{message}")]
    Multipart { status: StatusCode, message: String },

    /// Bad field value or archive. No processing call was made.
    #[error(transparent)]
    ClientInput(#[from] ValidationError),

    /// Processing service could not be reached
    #[error("Processing server is not available")]
    DownstreamUnavailable { phase: Phase },

    /// Processing service answered with an error, or timed out
    #[error("{message}")]
    DownstreamRejected {
        phase: Phase,
        status: Option<u16>,
        message: String,
    },

    /// Augmentation refused because an asset is unknown
    #[error("Asset not found for augmentation")]
    AssetNotFound,

    /// Ingestion answer breaks the manifest contract
    #[error("{0}")]
    ProtocolMismatch(String),
}

impl From<MultipartError> for ProcessError {
    fn from(err: MultipartError) -> Self {
        ProcessError::Multipart {
            status: err.status(),
            message: format!("Failed to read multipart field: {}", err.body_text()),
        }
    }
}

impl From<ManifestViolation> for ProcessError {
    fn from(violation: ManifestViolation) -> Self {
        ProcessError::ProtocolMismatch(violation.to_string())
    }
}

impl ProcessError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProcessError::Multipart { status, .. } => *status,
            ProcessError::ClientInput(e) => e.status(),
            ProcessError::DownstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProcessError::DownstreamRejected { phase, .. } => phase.rejected_status(),
            ProcessError::AssetNotFound => StatusCode::NOT_FOUND,
            ProcessError::ProtocolMismatch(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProcessError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            ProcessError::Multipart { .. } => warn!("Malformed upload: {}", self),
            ProcessError::ClientInput(e) => warn!(field = e.field(), "Validation failed: {}", e),
            ProcessError::DownstreamUnavailable { phase } => {
                error!("Processing server unreachable during {}", phase)
            }
            ProcessError::DownstreamRejected {
                phase,
                status: downstream_status,
                message,
            } => error!(
                "Processing server error during {} (status={:?}): {}",
                phase, downstream_status, message
            ),
            ProcessError::AssetNotFound => warn!("Augmentation refused: asset not found"),
            ProcessError::ProtocolMismatch(msg) => {
                error!("Invalid response from processing server: {}", msg)
            }
        }

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
