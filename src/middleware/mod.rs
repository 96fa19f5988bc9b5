// ==============================================================================
// middleware/mod.rs - API Gateway Request Extractors
// ==============================================================================
// Description: Request context supplied by the authenticating edge
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod auth;

pub use auth::VerifiedUser;
