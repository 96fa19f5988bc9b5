// ==============================================================================
// downstream/client.rs - Processing Service HTTP Client
// ==============================================================================
// Description: reqwest implementation of the processing service contract
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use async_trait::async_trait;
use axum::body::Bytes;
use futures::{stream::BoxStream, StreamExt};
use reqwest::{
    multipart::{Form, Part},
    Client, RequestBuilder, Response, StatusCode,
};
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use super::{DownstreamError, ProcessingService, API_KEY_HEADER, REQUEST_ID_HEADER};
use crate::config::Config;
use crate::models::{
    Archive, AssetManifest, AugmentOptions, AugmentRequest, DownstreamErrorBody, ParamsPayload,
    ProcessingParameters, DEFAULT_ARCHIVE_TYPE,
};
use crate::relay::{PassthroughHeaders, RelayStream};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the processing service.
///
/// Reuses a single `reqwest::Client` for connection pooling. Timeouts are set
/// per call since each phase has its own budget.
#[derive(Clone)]
pub struct DownstreamClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    params_timeout: Duration,
    upload_timeout: Duration,
    augment_timeout: Duration,
}

impl DownstreamClient {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

        Ok(Self {
            http,
            base_url: config.processing_url.trim_end_matches('/').to_string(),
            api_key: config.processing_api_key.clone(),
            params_timeout: config.params_timeout,
            upload_timeout: config.upload_timeout,
            augment_timeout: config.augment_timeout,
        })
    }

    fn post(&self, path: &str, request_id: Uuid) -> RequestBuilder {
        let request = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header(REQUEST_ID_HEADER, request_id.to_string());

        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<Response, DownstreamError> {
        request
            .send()
            .await
            .map_err(|e| DownstreamError::from_reqwest(e, timeout))
    }
}

/// Turn a non-success response into `Rejected`, keeping its diagnostic.
async fn rejection(response: Response) -> DownstreamError {
    let status = response.status().as_u16();
    let diagnostic = response
        .bytes()
        .await
        .ok()
        .and_then(|body| serde_json::from_slice::<DownstreamErrorBody>(&body).ok())
        .and_then(|body| body.diagnostic());

    DownstreamError::Rejected { status, diagnostic }
}

fn archive_part(archive: &Archive) -> Result<Part, DownstreamError> {
    let part = || {
        Part::stream_with_length(reqwest::Body::from(archive.data.clone()), archive.size() as u64)
            .file_name(archive.filename.clone())
    };

    part()
        .mime_str(&archive.content_type)
        .or_else(|_| part().mime_str(DEFAULT_ARCHIVE_TYPE))
        .map_err(|e| DownstreamError::Transport(e.to_string()))
}

/// Fail the stream when no chunk arrives within `idle`.
fn with_idle_timeout<E>(
    stream: BoxStream<'static, Result<Bytes, E>>,
    idle: Duration,
) -> BoxStream<'static, io::Result<Bytes>>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
{
    futures::stream::unfold(Some(stream), move |stream| async move {
        let mut stream = stream?;
        match tokio::time::timeout(idle, stream.next()).await {
            Ok(Some(chunk)) => Some((chunk.map_err(io::Error::other), Some(stream))),
            Ok(None) => None,
            Err(_) => {
                let err = io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no data from processing server for {:?}", idle),
                );
                Some((Err(err), None))
            }
        }
    })
    .boxed()
}

#[async_trait]
impl ProcessingService for DownstreamClient {
    async fn configure(
        &self,
        request_id: Uuid,
        parameters: &ProcessingParameters,
    ) -> Result<(), DownstreamError> {
        let request = self
            .post("/params", request_id)
            .timeout(self.params_timeout)
            .json(&ParamsPayload::from(parameters));

        let response = self.send(request, self.params_timeout).await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        debug!("/params acknowledged with HTTP {}", response.status());
        Ok(())
    }

    async fn ingest(
        &self,
        request_id: Uuid,
        archive: &Archive,
    ) -> Result<AssetManifest, DownstreamError> {
        let form = Form::new().part("file", archive_part(archive)?);
        let request = self
            .post("/upload/zip", request_id)
            .timeout(self.upload_timeout)
            .multipart(form);

        let started = Instant::now();
        let response = self.send(request, self.upload_timeout).await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DownstreamError::from_reqwest(e, self.upload_timeout))?;

        let manifest = serde_json::from_slice::<AssetManifest>(&body)
            .map_err(|e| DownstreamError::MalformedResponse(e.to_string()))?;

        info!(
            "/upload/zip answered in {} ms with {} asset(s)",
            started.elapsed().as_millis(),
            manifest.assets.len()
        );
        Ok(manifest)
    }

    async fn augment(
        &self,
        request_id: Uuid,
        asset_ids: &[String],
        options: &AugmentOptions,
    ) -> Result<RelayStream, DownstreamError> {
        // No per-request timeout here: it would cover the whole body and cut
        // off long but healthy transfers. Headers get a deadline, the body an
        // idle timeout.
        let request = self
            .post("/augment/smote", request_id)
            .json(&AugmentRequest::new(asset_ids, options));

        let started = Instant::now();
        let response = tokio::time::timeout(
            self.augment_timeout,
            self.send(request, self.augment_timeout),
        )
        .await
        .map_err(|_| DownstreamError::Timeout(self.augment_timeout))??;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        info!(
            "/augment/smote responded in {} ms, streaming ZIP to client",
            started.elapsed().as_millis()
        );

        let headers = PassthroughHeaders::from_downstream(response.headers());
        let body = with_idle_timeout(response.bytes_stream().boxed(), self.augment_timeout);

        Ok(RelayStream { headers, body })
    }

    async fn is_ready(&self) -> bool {
        self.http
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map(|r| r.status() == StatusCode::OK)
            .unwrap_or(false)
    }
}
