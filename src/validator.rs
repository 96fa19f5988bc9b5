// ==============================================================================
// validator.rs - Upload Validation (Augmentation Gateway)
// ==============================================================================
// Description: Validates the archive and numeric parameters of an upload
//              before any call to the processing service is made
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// Security: Extension allowlist, ZIP signature check, size limit, sanitized
//           filename forwarded downstream
// ==============================================================================
//
// Evaluation order is fixed: archive -> k_neighbour -> random_state ->
// target_ratio. The first failing field is reported.
//
// ==============================================================================

use axum::http::StatusCode;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::models::{Archive, ProcessingParameters, UploadRequest, ValidatedUpload};

const ARCHIVE_EXTENSION: &str = ".zip";

/// Local file header / empty archive (end of central directory) signatures
const ZIP_SIGNATURES: [&[u8]; 2] = [b"PK\x03\x04", b"PK\x05\x06"];

/// Tokens meaning "no target ratio, let the processing service choose"
const RATIO_SENTINELS: [&str; 2] = ["null", "none"];

const MIN_K_NEIGHBOURS: i64 = 2;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("No file uploaded")]
    MissingArchive,

    #[error("Only .zip files are allowed")]
    InvalidArchiveType,

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    ArchiveTooLarge { size: usize, max: usize },

    #[error("Uploaded file is not a valid zip archive")]
    InvalidArchive,

    #[error("k_neighbour must be greater than 1")]
    InvalidNeighbourCount,

    #[error("random_state must be a valid integer")]
    InvalidRandomState,

    #[error("target_ratio must be between 0.0 and 1.0")]
    InvalidTargetRatio,
}

impl ValidationError {
    /// Multipart field the failure refers to
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingArchive
            | ValidationError::InvalidArchiveType
            | ValidationError::ArchiveTooLarge { .. }
            | ValidationError::InvalidArchive => "zipFile",
            ValidationError::InvalidNeighbourCount => "k_neighbour",
            ValidationError::InvalidRandomState => "random_state",
            ValidationError::InvalidTargetRatio => "target_ratio",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ValidationError::ArchiveTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

pub struct UploadValidator {
    max_archive_bytes: usize,
}

impl UploadValidator {
    pub fn new(max_archive_bytes: usize) -> Self {
        Self { max_archive_bytes }
    }

    /// Validate a collected upload. Pure: no I/O, no side effects.
    pub fn validate(&self, request: UploadRequest) -> Result<ValidatedUpload, ValidationError> {
        let archive = self.validate_archive(request.archive)?;
        let k_neighbours = parse_k_neighbours(request.k_neighbour.as_deref())?;
        let random_state = parse_random_state(request.random_state.as_deref())?;
        let target_ratio = parse_target_ratio(request.target_ratio.as_deref())?;

        Ok(ValidatedUpload {
            parameters: ProcessingParameters {
                k_neighbours,
                target_ratio,
                random_state,
            },
            archive,
        })
    }

    fn validate_archive(&self, archive: Option<Archive>) -> Result<Archive, ValidationError> {
        let archive = archive.ok_or(ValidationError::MissingArchive)?;

        if !archive.filename.to_lowercase().ends_with(ARCHIVE_EXTENSION) {
            return Err(ValidationError::InvalidArchiveType);
        }

        let size = archive.size();
        if size > self.max_archive_bytes {
            return Err(ValidationError::ArchiveTooLarge {
                size,
                max: self.max_archive_bytes,
            });
        }

        if !ZIP_SIGNATURES
            .iter()
            .any(|magic| archive.data.starts_with(magic))
        {
            return Err(ValidationError::InvalidArchive);
        }
        debug!("Archive signature check passed ({} bytes)", size);

        Ok(Archive {
            filename: sanitize_filename(&archive.filename),
            ..archive
        })
    }
}

/// Whole trimmed field must be an integer: `"5abc"` and `"2.5"` are rejected
/// rather than truncated to their leading digits.
fn parse_k_neighbours(raw: Option<&str>) -> Result<u32, ValidationError> {
    let value = raw
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|k| *k >= MIN_K_NEIGHBOURS)
        .ok_or(ValidationError::InvalidNeighbourCount)?;

    u32::try_from(value).map_err(|_| ValidationError::InvalidNeighbourCount)
}

/// Same strict integer rule as `k_neighbour`.
fn parse_random_state(raw: Option<&str>) -> Result<i64, ValidationError> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or(ValidationError::InvalidRandomState)
}

fn parse_target_ratio(raw: Option<&str>) -> Result<Option<f64>, ValidationError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(s) if RATIO_SENTINELS.iter().any(|t| s.eq_ignore_ascii_case(t)) => return Ok(None),
        Some(s) => s,
    };

    // RangeInclusive::contains is false for NaN
    raw.parse::<f64>()
        .ok()
        .filter(|r| (0.0..=1.0).contains(r))
        .map(Some)
        .ok_or(ValidationError::InvalidTargetRatio)
}

/// Strip path components and anything outside `[A-Za-z0-9._-]`.
///
/// Falls back to `upload.zip` when nothing usable remains.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let safe: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.' || *c == '-')
        .take(255)
        .collect();

    let safe = safe.trim_start_matches('.');
    if safe.is_empty() || safe.eq_ignore_ascii_case("zip") {
        "upload.zip".to_string()
    } else {
        safe.to_string()
    }
}

/// Hex SHA-256 of the archive, used for log correlation
pub fn archive_digest(archive: &Archive) -> String {
    let mut hasher = Sha256::new();
    hasher.update(&archive.data);
    format!("{:x}", hasher.finalize())
}
