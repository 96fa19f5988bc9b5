// ==============================================================================
// state.rs - Application State Management
// ==============================================================================
// Description: Shared application state for the augmentation gateway
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::downstream::{DownstreamClient, ProcessingService};
use crate::validator::UploadValidator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Gateway configuration
    config: Config,

    /// Processing service (HTTP client in production)
    processing: Arc<dyn ProcessingService>,
}

impl AppState {
    /// Create application state backed by the HTTP processing client
    pub fn new(config: Config) -> Result<Self> {
        let client =
            DownstreamClient::new(&config).context("Failed to build processing service client")?;

        Ok(Self::with_service(config, Arc::new(client)))
    }

    /// Create application state with a given processing service
    pub fn with_service(config: Config, processing: Arc<dyn ProcessingService>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, processing }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get processing service
    pub fn processing(&self) -> &dyn ProcessingService {
        self.inner.processing.as_ref()
    }

    /// Validator configured with the upload size limit
    pub fn validator(&self) -> UploadValidator {
        UploadValidator::new(self.inner.config.max_upload_bytes)
    }
}
