// ==============================================================================
// tests/gateway.rs - Gateway Integration Tests
// ==============================================================================
// Description: Runs the gateway against a mock processing service over real
//              sockets, using the production reqwest client
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use augment_gateway::{build_router, AppState, Config};
use axum::{
    body::{Body, Bytes},
    extract::{Multipart, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

const ZIP: &[u8] = b"PK\x03\x04original-archive-bytes";
const AUGMENTED: &[u8] = b"PK\x03\x04augmented-archive-bytes";
const API_KEY: &str = "test-shared-secret";

// ------------------------------------------------------------------------------
// Mock processing service
// ------------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum AugmentMode {
    Zip,
    NotFound,
    Rejected(&'static str),
    /// Connection dropped before any response header
    FailBeforeHeaders,
    /// Headers and a first chunk go out, then the body fails
    FailMidStream,
    /// Chunks keep coming until the reader goes away
    Endless,
    /// Steady chunks whose total time exceeds the augment timeout
    SlowSteady,
}

const SLOW_CHUNK: &[u8] = b"slow-chunk";
const SLOW_CHUNKS: usize = 8;

#[derive(Default)]
struct Recorded {
    params_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    augment_calls: AtomicUsize,
    params_body: Mutex<Option<Value>>,
    augment_body: Mutex<Option<Value>>,
    uploaded: Mutex<Option<(String, Vec<u8>)>>,
    api_keys: Mutex<Vec<String>>,
    request_ids: Mutex<Vec<String>>,
    stream_dropped: Arc<AtomicBool>,
}

impl Recorded {
    fn calls(&self) -> (usize, usize, usize) {
        (
            self.params_calls.load(Ordering::SeqCst),
            self.upload_calls.load(Ordering::SeqCst),
            self.augment_calls.load(Ordering::SeqCst),
        )
    }

    fn headers(&self, headers: &HeaderMap) {
        if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
            self.api_keys.lock().unwrap().push(key.to_string());
        }
        if let Some(id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
            self.request_ids.lock().unwrap().push(id.to_string());
        }
    }
}

#[derive(Clone)]
struct Mock {
    recorded: Arc<Recorded>,
    manifest: Value,
    augment: AugmentMode,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

async fn mock_params(
    State(mock): State<Mock>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    mock.recorded.params_calls.fetch_add(1, Ordering::SeqCst);
    mock.recorded.headers(&headers);
    *mock.recorded.params_body.lock().unwrap() = Some(body.clone());
    Json(body["data"].clone())
}

async fn mock_upload(
    State(mock): State<Mock>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Json<Value> {
    mock.recorded.upload_calls.fetch_add(1, Ordering::SeqCst);
    mock.recorded.headers(&headers);
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("").to_string();
            let data = field.bytes().await.unwrap().to_vec();
            *mock.recorded.uploaded.lock().unwrap() = Some((filename, data));
        }
    }
    Json(mock.manifest.clone())
}

async fn mock_augment(
    State(mock): State<Mock>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mock.recorded.augment_calls.fetch_add(1, Ordering::SeqCst);
    mock.recorded.headers(&headers);
    *mock.recorded.augment_body.lock().unwrap() = Some(body);

    let zip_headers = [
        (header::CONTENT_TYPE, "application/zip"),
        (header::HeaderName::from_static("x-internal-worker"), "gpu-7"),
    ];

    match mock.augment {
        AugmentMode::Zip => (
            zip_headers,
            [(
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"augmented_dataset.zip\"",
            )],
            AUGMENTED,
        )
            .into_response(),
        AugmentMode::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Asset a1 not found"})),
        )
            .into_response(),
        AugmentMode::Rejected(detail) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": detail})),
        )
            .into_response(),
        AugmentMode::FailBeforeHeaders => {
            let chunks: Vec<io::Result<Bytes>> = vec![Err(io::Error::new(
                io::ErrorKind::Other,
                "augmentation worker crashed",
            ))];
            (zip_headers, Body::from_stream(futures::stream::iter(chunks))).into_response()
        }
        AugmentMode::FailMidStream => {
            let chunks: Vec<io::Result<Bytes>> = vec![
                Ok(Bytes::from_static(b"PK\x03\x04partial")),
                Err(io::Error::new(io::ErrorKind::Other, "augmentation worker crashed")),
            ];
            // Hold the error back so the headers are flushed first
            let stream = futures::stream::iter(chunks).then(|chunk| async move {
                if chunk.is_err() {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                chunk
            });
            (zip_headers, Body::from_stream(stream)).into_response()
        }
        AugmentMode::SlowSteady => {
            let stream = futures::stream::iter(0..SLOW_CHUNKS).then(|i| async move {
                if i > 0 {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Ok::<_, io::Error>(Bytes::from_static(SLOW_CHUNK))
            });
            (zip_headers, Body::from_stream(stream)).into_response()
        }
        AugmentMode::Endless => {
            let flag = DropFlag(mock.recorded.stream_dropped.clone());
            let stream = futures::stream::unfold(flag, |flag| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Some((Ok::<_, io::Error>(Bytes::from(vec![7u8; 16 * 1024])), flag))
            });
            (zip_headers, Body::from_stream(stream)).into_response()
        }
    }
}

async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_processing(manifest: Value, augment: AugmentMode) -> (String, Arc<Recorded>) {
    let recorded = Arc::new(Recorded::default());
    let mock = Mock {
        recorded: recorded.clone(),
        manifest,
        augment,
    };
    let app = Router::new()
        .route("/params", post(mock_params))
        .route("/upload/zip", post(mock_upload))
        .route("/augment/smote", post(mock_augment))
        .with_state(mock);
    (spawn(app).await, recorded)
}

fn two_assets() -> Value {
    json!({
        "count": 2,
        "assets": [
            {"id": "a1", "filename": "cat.png", "url": "/assets/a1", "label": "cat"},
            {"id": "b2", "filename": "dog.png", "url": "/assets/b2", "label": "dog"}
        ]
    })
}

// ------------------------------------------------------------------------------
// Gateway
// ------------------------------------------------------------------------------

fn gateway_config(processing_url: &str) -> Config {
    Config {
        processing_url: processing_url.to_string(),
        processing_api_key: Some(API_KEY.to_string()),
        ..Config::default()
    }
}

async fn spawn_gateway(processing_url: &str) -> String {
    spawn_gateway_with(gateway_config(processing_url)).await
}

async fn spawn_gateway_with(config: Config) -> String {
    spawn(build_router(AppState::new(config).unwrap())).await
}

async fn submit(gateway: &str, k: &str, ratio: &str, seed: &str) -> reqwest::Response {
    let archive = reqwest::multipart::Part::bytes(ZIP.to_vec())
        .file_name("images.zip")
        .mime_str("application/zip")
        .unwrap();
    let form = reqwest::multipart::Form::new()
        .part("zipFile", archive)
        .text("k_neighbour", k.to_string())
        .text("target_ratio", ratio.to_string())
        .text("random_state", seed.to_string());

    reqwest::Client::new()
        .post(format!("{}/api/process", gateway))
        .header("X-authentik-username", "alice")
        .multipart(form)
        .send()
        .await
        .unwrap()
}

async fn message(response: reqwest::Response) -> String {
    let body: Value = response.json().await.unwrap();
    body["message"].as_str().unwrap().to_string()
}

/// Port with nothing listening on it
async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

// ------------------------------------------------------------------------------
// Scenarios
// ------------------------------------------------------------------------------

#[tokio::test]
async fn test_full_pipeline_relays_identical_bytes() {
    let (processing, recorded) = spawn_processing(two_assets(), AugmentMode::Zip).await;
    let gateway = spawn_gateway(&processing).await;

    let response = submit(&gateway, "5", "null", "42").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"augmented_dataset.zip\""
    );
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    assert!(response.headers().get("x-internal-worker").is_none());
    assert_eq!(&response.bytes().await.unwrap()[..], AUGMENTED);

    assert_eq!(recorded.calls(), (1, 1, 1));
    assert_eq!(
        recorded.params_body.lock().unwrap().clone().unwrap(),
        json!({"data": {"kneighbors": 5, "targetratio": null, "randomstate": 42}})
    );
    assert_eq!(
        recorded.uploaded.lock().unwrap().clone().unwrap(),
        ("images.zip".to_string(), ZIP.to_vec())
    );
    assert_eq!(
        recorded.augment_body.lock().unwrap().clone().unwrap(),
        json!({
            "images": [{"asset_id": "a1"}, {"asset_id": "b2"}],
            "options": {"horizontal_flip": false, "rotate_deg": null}
        })
    );

    // Shared secret and one request id on every call
    assert_eq!(*recorded.api_keys.lock().unwrap(), vec![API_KEY; 3]);
    let ids = recorded.request_ids.lock().unwrap().clone();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| id == &ids[0]));
}

#[tokio::test]
async fn test_target_ratio_forwarded() {
    let (processing, recorded) = spawn_processing(two_assets(), AugmentMode::Zip).await;
    let gateway = spawn_gateway(&processing).await;

    let response = submit(&gateway, "2", "0.25", "-1").await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        recorded.params_body.lock().unwrap().clone().unwrap(),
        json!({"data": {"kneighbors": 2, "targetratio": 0.25, "randomstate": -1}})
    );
}

#[tokio::test]
async fn test_neighbour_count_one_never_calls_processing() {
    let (processing, recorded) = spawn_processing(two_assets(), AugmentMode::Zip).await;
    let gateway = spawn_gateway(&processing).await;

    let response = submit(&gateway, "1", "null", "42").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(message(response).await, "k_neighbour must be greater than 1");
    assert_eq!(recorded.calls(), (0, 0, 0));
}

#[tokio::test]
async fn test_processing_unreachable_is_503() {
    let gateway = spawn_gateway(&closed_port_url().await).await;

    let response = submit(&gateway, "5", "null", "42").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(message(response).await, "Processing server is not available");
}

#[tokio::test]
async fn test_empty_manifest_is_protocol_mismatch() {
    let (processing, recorded) =
        spawn_processing(json!({"count": 0, "assets": []}), AugmentMode::Zip).await;
    let gateway = spawn_gateway(&processing).await;

    let response = submit(&gateway, "5", "null", "42").await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        message(response).await,
        "Invalid response from processing server (/upload/zip)"
    );
    assert_eq!(recorded.calls(), (1, 1, 0));
}

#[tokio::test]
async fn test_missing_asset_id_is_protocol_mismatch() {
    let (processing, recorded) = spawn_processing(
        json!({"assets": [{"id": "a1"}, {"filename": "dog.png"}]}),
        AugmentMode::Zip,
    )
    .await;
    let gateway = spawn_gateway(&processing).await;

    let response = submit(&gateway, "5", "null", "42").await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(message(response).await, "Missing asset id from processing server");
    assert_eq!(recorded.calls(), (1, 1, 0));
}

#[tokio::test]
async fn test_augment_not_found_is_404_without_stream() {
    let (processing, recorded) = spawn_processing(two_assets(), AugmentMode::NotFound).await;
    let gateway = spawn_gateway(&processing).await;

    let response = submit(&gateway, "5", "null", "42").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());
    assert_eq!(message(response).await, "Asset not found for augmentation");
    assert_eq!(recorded.calls(), (1, 1, 1));
}

#[tokio::test]
async fn test_augment_failure_carries_detail() {
    let (processing, _) =
        spawn_processing(two_assets(), AugmentMode::Rejected("SMOTE needs more samples")).await;
    let gateway = spawn_gateway(&processing).await;

    let response = submit(&gateway, "5", "null", "42").await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(message(response).await, "SMOTE needs more samples");
}

#[tokio::test]
async fn test_mid_stream_failure_aborts_connection() {
    let (processing, recorded) = spawn_processing(two_assets(), AugmentMode::FailMidStream).await;
    let gateway = spawn_gateway(&processing).await;

    let response = submit(&gateway, "5", "null", "42").await;

    // Headers were already sent; the body must not complete cleanly
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.bytes().await.is_err());
    assert_eq!(recorded.calls(), (1, 1, 1));
}

#[tokio::test]
async fn test_augment_failure_before_headers_is_422() {
    let (processing, recorded) =
        spawn_processing(two_assets(), AugmentMode::FailBeforeHeaders).await;
    let gateway = spawn_gateway(&processing).await;

    let response = submit(&gateway, "5", "null", "42").await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());
    assert_eq!(message(response).await, "Failed to augment dataset");
    assert_eq!(recorded.calls(), (1, 1, 1));
}

#[tokio::test]
async fn test_long_steady_stream_outlives_augment_timeout() {
    let (processing, recorded) = spawn_processing(two_assets(), AugmentMode::SlowSteady).await;
    let gateway = spawn_gateway_with(Config {
        augment_timeout: Duration::from_millis(200),
        ..gateway_config(&processing)
    })
    .await;

    let response = submit(&gateway, "5", "null", "42").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.bytes().await.unwrap();
    assert_eq!(body.len(), SLOW_CHUNK.len() * SLOW_CHUNKS);
    assert!(body.chunks(SLOW_CHUNK.len()).all(|c| c == SLOW_CHUNK));
    assert_eq!(recorded.calls(), (1, 1, 1));
}

#[tokio::test]
async fn test_readiness_reports_unreachable_processing() {
    let gateway = spawn_gateway(&closed_port_url().await).await;

    let response = reqwest::get(format!("{}/api/ready", gateway)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"ready": false, "processing_server": false}));
}

#[tokio::test]
async fn test_client_disconnect_cancels_processing_stream() {
    let (processing, recorded) = spawn_processing(two_assets(), AugmentMode::Endless).await;
    let gateway = spawn_gateway(&processing).await;

    let mut response = submit(&gateway, "5", "null", "42").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.chunk().await.unwrap().is_some());
    drop(response);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !recorded.stream_dropped.load(Ordering::SeqCst) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "processing stream was not cancelled after client disconnect"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Cancelled, not retried
    assert_eq!(recorded.calls(), (1, 1, 1));
}
