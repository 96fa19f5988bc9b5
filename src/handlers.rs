// ==============================================================================
// handlers.rs - API Request Handlers
// ==============================================================================
// Description: HTTP request handlers for the augmentation gateway
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    error::ProcessError,
    middleware::VerifiedUser,
    models::*,
    pipeline,
    state::AppState,
    validator::archive_digest,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Root endpoint - API information
pub async fn root() -> Json<ApiInfoResponse> {
    Json(ApiInfoResponse {
        service: "Augmentation Gateway",
        version: VERSION,
        endpoints: vec![
            "/api/health - Health check",
            "/api/ready - Readiness check",
            "/api/process - Upload ZIP and download augmented dataset (POST)",
        ],
    })
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: VERSION,
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let processing_ready = state.processing().is_ready().await;

    let response = ReadinessResponse {
        ready: processing_ready,
        processing_server: processing_ready,
    };

    let status = if processing_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Process upload endpoint
///
/// Validates the form, then configures, ingests and augments against the
/// processing service and streams the augmented ZIP back. Errors before the
/// stream starts are returned as `{message}` JSON.
#[axum::debug_handler]
pub async fn process_upload(
    State(state): State<AppState>,
    VerifiedUser(user): VerifiedUser,
    multipart: Multipart,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("process", request_id = %request_id, user = %user);

    async move {
        process(state, request_id, multipart)
            .await
            .unwrap_or_else(IntoResponse::into_response)
    }
    .instrument(span)
    .await
}

async fn process(
    state: AppState,
    request_id: Uuid,
    multipart: Multipart,
) -> Result<Response, ProcessError> {
    let request = read_upload(multipart).await?;
    info!(
        "Request received: POST /api/process (zipFile={}, k_neighbour={:?}, target_ratio={:?}, random_state={:?})",
        request
            .archive
            .as_ref()
            .map(|a| a.filename.as_str())
            .unwrap_or("none"),
        request.k_neighbour,
        request.target_ratio,
        request.random_state
    );

    let upload = state.validator().validate(request)?;

    let digest = archive_digest(&upload.archive);
    info!(
        "Archive validated: {} ({} bytes, SHA256: {})",
        upload.archive.filename,
        upload.archive.size(),
        &digest[..16]
    );

    let stream = pipeline::run(state.processing(), request_id, upload).await?;

    Ok(stream.into_response(request_id))
}

/// Collect the multipart form into an unvalidated upload
async fn read_upload(mut multipart: Multipart) -> Result<UploadRequest, ProcessError> {
    let mut request = UploadRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "zipFile" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_ARCHIVE_TYPE)
                    .to_string();
                let data = field.bytes().await?;

                // Browsers send an empty, unnamed part when no file is chosen
                if filename.is_empty() && data.is_empty() {
                    continue;
                }

                request.archive = Some(Archive {
                    filename,
                    content_type,
                    data,
                });
            }
            "k_neighbour" => request.k_neighbour = Some(field.text().await?),
            "target_ratio" => request.target_ratio = Some(field.text().await?),
            "random_state" => request.random_state = Some(field.text().await?),
            _ => {
                warn!("Unknown multipart field: {}", name);
            }
        }
    }

    Ok(request)
}
