// ==============================================================================
// middleware/auth.rs - Verified User Extractor
// ==============================================================================
// Description: Extract the user identity attached by the authenticating edge
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
//
// Authentication happens upstream (Traefik + Authentik forward auth). The
// proxy sets X-authentik-username on requests it let through; this gateway
// only requires that the header is present and uses it for log context.
//
// ==============================================================================

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::models::ErrorResponse;

pub const VERIFIED_USER_HEADER: &str = "X-authentik-username";

/// User identity verified by the authenticating proxy
#[derive(Debug, Clone)]
pub struct VerifiedUser(pub String);

impl<S> FromRequestParts<S> for VerifiedUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let username = parts
            .headers
            .get(VERIFIED_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match username {
            Some(username) => Ok(VerifiedUser(username.to_string())),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Missing verified user context")),
            )
                .into_response()),
        }
    }
}
