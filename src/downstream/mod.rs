// ==============================================================================
// downstream/mod.rs - Processing Service Interface
// ==============================================================================
// Description: Contract between the upload pipeline and the processing
//              service, plus the errors a call can produce
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod client;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Archive, AssetManifest, AugmentOptions, ProcessingParameters};
use crate::relay::RelayStream;

pub use client::DownstreamClient;

/// Header carrying the shared secret on every processing call
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Header carrying the gateway's request id on every processing call
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

#[derive(Debug, Error)]
pub enum DownstreamError {
    /// Connection could not be established (refused, DNS, connect timeout)
    #[error("processing server unreachable: {0}")]
    Unavailable(String),

    /// Request was sent but no complete answer arrived in time
    #[error("processing server timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success HTTP status
    #[error("processing server returned HTTP {status}")]
    Rejected {
        status: u16,
        diagnostic: Option<String>,
    },

    /// Connection broke after it was established
    #[error("transport error: {0}")]
    Transport(String),

    /// Success status, but the body isn't what the contract says
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl DownstreamError {
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_connect() {
            DownstreamError::Unavailable(err.to_string())
        } else if err.is_timeout() {
            DownstreamError::Timeout(timeout)
        } else {
            DownstreamError::Transport(err.to_string())
        }
    }
}

/// The three calls the pipeline makes, in order, for one upload.
///
/// Implementations must not retry: each call is issued at most once.
#[async_trait]
pub trait ProcessingService: Send + Sync {
    /// `POST /params`; acknowledgment only
    async fn configure(
        &self,
        request_id: Uuid,
        parameters: &ProcessingParameters,
    ) -> Result<(), DownstreamError>;

    /// `POST /upload/zip`; returns the manifest as sent, unchecked
    async fn ingest(&self, request_id: Uuid, archive: &Archive)
        -> Result<AssetManifest, DownstreamError>;

    /// `POST /augment/smote`; returns once response headers arrive
    async fn augment(
        &self,
        request_id: Uuid,
        asset_ids: &[String],
        options: &AugmentOptions,
    ) -> Result<RelayStream, DownstreamError>;

    /// Liveness probe used by the readiness endpoint
    async fn is_ready(&self) -> bool;
}
