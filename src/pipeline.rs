// ==============================================================================
// pipeline.rs - Upload Processing Pipeline
// ==============================================================================
// Description: Drives one validated upload through handoff, ingestion and
//              augmentation against the processing service
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
//
// Stages:
//
//   Validated --configure--> Configured --ingest--> Ingested --augment--> Streaming
//
// Each stage owns exactly what the next call needs; nothing is shared or
// mutated across stages. Any failed call ends the pipeline with a single
// ProcessError. No call is retried.
//
// ==============================================================================

use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::downstream::{DownstreamError, ProcessingService};
use crate::error::{Phase, ProcessError};
use crate::models::{Archive, AugmentOptions, ValidatedUpload};
use crate::relay::RelayStream;

/// Progress of one upload through the processing service
#[derive(Debug)]
enum Stage {
    /// Input accepted; nothing sent yet
    Validated(ValidatedUpload),
    /// Parameters acknowledged; archive still to send
    Configured(Archive),
    /// Manifest checked; asset ids ready for augmentation
    Ingested(Vec<String>),
    /// Augmented archive headers received
    Streaming(RelayStream),
}

impl Stage {
    fn phase(&self) -> Option<Phase> {
        match self {
            Stage::Validated(_) => Some(Phase::Handoff),
            Stage::Configured(_) => Some(Phase::Ingestion),
            Stage::Ingested(_) => Some(Phase::Augmentation),
            Stage::Streaming(_) => None,
        }
    }
}

/// Map a failed call onto the client-facing error for its phase.
fn classify(phase: Phase, err: DownstreamError) -> ProcessError {
    match err {
        DownstreamError::Unavailable(_) => ProcessError::DownstreamUnavailable { phase },
        DownstreamError::Rejected { status: 404, .. } if phase == Phase::Augmentation => {
            ProcessError::AssetNotFound
        }
        DownstreamError::Rejected { status, diagnostic } => ProcessError::DownstreamRejected {
            phase,
            status: Some(status),
            message: diagnostic.unwrap_or_else(|| phase.fallback_message().to_string()),
        },
        DownstreamError::MalformedResponse(detail) if phase == Phase::Ingestion => {
            warn!("{} returned an unparsable manifest: {}", phase, detail);
            ProcessError::ProtocolMismatch(
                "Invalid response from processing server (/upload/zip)".to_string(),
            )
        }
        DownstreamError::Timeout(after) => {
            if phase == Phase::Handoff {
                // The service may have applied the parameters before the
                // deadline; there is no way to tell from here.
                warn!(
                    "/params timed out after {:?}; processing server may hold partially applied parameters",
                    after
                );
            }
            ProcessError::DownstreamRejected {
                phase,
                status: None,
                message: phase.fallback_message().to_string(),
            }
        }
        DownstreamError::Transport(_) | DownstreamError::MalformedResponse(_) => {
            ProcessError::DownstreamRejected {
                phase,
                status: None,
                message: phase.fallback_message().to_string(),
            }
        }
    }
}

/// Run the three processing calls for one upload.
///
/// Returns the augmented archive stream once its headers have arrived;
/// streaming the body is left to the relay.
pub async fn run<S>(
    service: &S,
    request_id: Uuid,
    upload: ValidatedUpload,
) -> Result<RelayStream, ProcessError>
where
    S: ProcessingService + ?Sized,
{
    let mut stage = Stage::Validated(upload);

    loop {
        let phase = stage.phase();
        let started = Instant::now();

        stage = match stage {
            Stage::Validated(upload) => {
                let params = upload.parameters;
                info!(
                    "-> Sending /params: kneighbors={}, targetratio={:?}, randomstate={}",
                    params.k_neighbours, params.target_ratio, params.random_state
                );
                service
                    .configure(request_id, &params)
                    .await
                    .map_err(|e| classify(Phase::Handoff, e))?;
                info!("/params acknowledged");
                Stage::Configured(upload.archive)
            }

            Stage::Configured(archive) => {
                info!(
                    "Uploading ZIP to /upload/zip: filename={}, size={} bytes",
                    archive.filename,
                    archive.size()
                );
                let manifest = service
                    .ingest(request_id, &archive)
                    .await
                    .map_err(|e| classify(Phase::Ingestion, e))?;
                let asset_ids = manifest.asset_ids()?;
                info!(
                    "/upload/zip OK in {} ms: assets={} [{}]",
                    started.elapsed().as_millis(),
                    asset_ids.len(),
                    asset_ids.join(", ")
                );
                Stage::Ingested(asset_ids)
            }

            Stage::Ingested(asset_ids) => {
                info!("Requesting /augment/smote for {} asset(s)", asset_ids.len());
                let stream = service
                    .augment(request_id, &asset_ids, &AugmentOptions::default())
                    .await
                    .map_err(|e| classify(Phase::Augmentation, e))?;
                Stage::Streaming(stream)
            }

            Stage::Streaming(stream) => return Ok(stream),
        };

        if let Some(phase) = phase {
            debug!("{} finished in {} ms", phase, started.elapsed().as_millis());
        }
    }
}
