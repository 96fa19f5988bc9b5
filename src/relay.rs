// ==============================================================================
// relay.rs - Augmented Archive Relay
// ==============================================================================
// Description: Pipes the processing service's augmented ZIP stream into the
//              client response without buffering it
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
//
// Once headers are sent the response can't become an error body, so a
// downstream failure is returned as a body error and hyper aborts the
// connection. If the client goes away, hyper drops the body, which drops the
// downstream stream and closes that connection as well.
//
// ==============================================================================

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream::{BoxStream, Stream};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Used when the processing service doesn't name the file
pub const DEFAULT_CONTENT_DISPOSITION: &str = "attachment; filename=\"augmented_dataset.zip\"";

/// Downstream headers allowed through to the client. Nothing else is copied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassthroughHeaders {
    pub content_type: Option<HeaderValue>,
    pub content_disposition: Option<HeaderValue>,
    pub content_length: Option<u64>,
}

impl PassthroughHeaders {
    pub fn from_downstream(headers: &HeaderMap) -> Self {
        Self {
            content_type: headers.get(header::CONTENT_TYPE).cloned(),
            content_disposition: headers.get(header::CONTENT_DISPOSITION).cloned(),
            content_length: headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
        }
    }

    pub fn to_header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(content_type) = &self.content_type {
            headers.insert(header::CONTENT_TYPE, content_type.clone());
        }

        headers.insert(
            header::CONTENT_DISPOSITION,
            self.content_disposition
                .clone()
                .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_DISPOSITION)),
        );

        if let Some(length) = self.content_length {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        }

        headers
    }
}

/// Augmented archive as handed over by the processing service
pub struct RelayStream {
    pub headers: PassthroughHeaders,
    pub body: BoxStream<'static, io::Result<Bytes>>,
}

impl fmt::Debug for RelayStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayStream")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl RelayStream {
    /// Turn the stream into a 200 response with whitelisted headers.
    pub fn into_response(self, request_id: Uuid) -> Response {
        let headers = self.headers.to_header_map();
        let body = RelayBody::new(self.body, request_id);
        (StatusCode::OK, headers, Body::from_stream(body)).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortCause {
    /// Processing service stream failed after headers went out
    Downstream(String),
    /// Client connection closed before the stream ended
    ClientDisconnected,
}

/// Terminal state of a relay. Reported exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed { bytes: u64 },
    Aborted { bytes: u64, cause: AbortCause },
}

/// Response body that forwards downstream chunks and tracks the outcome.
pub struct RelayBody {
    inner: Option<BoxStream<'static, io::Result<Bytes>>>,
    request_id: Uuid,
    bytes_sent: u64,
    started: Instant,
    observer: Option<oneshot::Sender<RelayOutcome>>,
}

impl RelayBody {
    pub fn new(inner: BoxStream<'static, io::Result<Bytes>>, request_id: Uuid) -> Self {
        Self {
            inner: Some(inner),
            request_id,
            bytes_sent: 0,
            started: Instant::now(),
            observer: None,
        }
    }

    /// Receive the outcome once the relay reaches a terminal state.
    #[cfg(test)]
    pub(crate) fn observe(&mut self) -> oneshot::Receiver<RelayOutcome> {
        let (tx, rx) = oneshot::channel();
        self.observer = Some(tx);
        rx
    }

    /// Drop the downstream stream and report. No-op after the first call.
    fn finish(&mut self, cause: Option<AbortCause>) {
        if self.inner.take().is_none() {
            return;
        }

        let elapsed_ms = self.started.elapsed().as_millis();
        let outcome = match cause {
            None => {
                info!(
                    request_id = %self.request_id,
                    bytes = self.bytes_sent,
                    elapsed_ms,
                    "Relay completed (augmented ZIP sent)"
                );
                RelayOutcome::Completed {
                    bytes: self.bytes_sent,
                }
            }
            Some(AbortCause::ClientDisconnected) => {
                warn!(
                    request_id = %self.request_id,
                    bytes = self.bytes_sent,
                    elapsed_ms,
                    "Client disconnected mid-stream, cancelling downstream stream"
                );
                RelayOutcome::Aborted {
                    bytes: self.bytes_sent,
                    cause: AbortCause::ClientDisconnected,
                }
            }
            Some(AbortCause::Downstream(reason)) => {
                error!(
                    request_id = %self.request_id,
                    bytes = self.bytes_sent,
                    elapsed_ms,
                    "Stream error (augment zip -> client): {}",
                    reason
                );
                RelayOutcome::Aborted {
                    bytes: self.bytes_sent,
                    cause: AbortCause::Downstream(reason),
                }
            }
        };

        if let Some(observer) = self.observer.take() {
            let _ = observer.send(outcome);
        }
    }
}

impl Stream for RelayBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        let polled = match this.inner.as_mut() {
            Some(inner) => inner.as_mut().poll_next(cx),
            None => return Poll::Ready(None),
        };

        match polled {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes_sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish(Some(AbortCause::Downstream(e.to_string())));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish(None);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RelayBody {
    fn drop(&mut self) {
        self.finish(Some(AbortCause::ClientDisconnected));
    }
}
