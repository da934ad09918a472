//! Test utilities for spendly-core
//!
//! Mock HTTP servers for the model and channel clients, plus in-process fakes
//! for every channel trait so the router can be driven end to end.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::oneshot;

use crate::channels::{
    Channels, ImageStore, LoginLinkIssuer, MediaFetcher, Messenger, RandomSource, TextRecognizer,
};
use crate::clock::Clock;
use crate::error::{Error, Result};

async fn spawn_server(app: Router) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .unwrap();
    });

    (addr, shutdown_tx)
}

/// Mock Ollama server answering every generate call with the same text
pub struct MockOllamaServer {
    addr: SocketAddr,
    requests: Arc<AtomicU32>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

#[derive(Clone)]
struct OllamaState {
    response: Arc<String>,
    requests: Arc<AtomicU32>,
}

#[derive(Deserialize)]
struct GenerateRequest {
    model: String,
}

impl MockOllamaServer {
    /// Start on an available port; `response` is the model's raw text
    pub async fn start(response: &str) -> Self {
        let requests = Arc::new(AtomicU32::new(0));
        let state = OllamaState {
            response: Arc::new(response.to_string()),
            requests: Arc::clone(&requests),
        };
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .with_state(state);

        let (addr, shutdown_tx) = spawn_server(app).await;
        Self {
            addr,
            requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Generate calls served so far
    pub fn request_count(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_tags() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "models": [{"name": "llama3.2:latest", "size": 4_000_000_000u64}]
    }))
}

async fn handle_generate(
    State(state): State<OllamaState>,
    Json(request): Json<GenerateRequest>,
) -> Json<serde_json::Value> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({
        "model": request.model,
        "response": state.response.as_str(),
        "done": true,
    }))
}

/// One request seen by `MockHttpServer`
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Clone)]
struct HttpState {
    status: StatusCode,
    body: Arc<String>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Catch-all HTTP server returning one canned JSON response
///
/// Stands in for Twilio, Cloudinary and Vision.
pub struct MockHttpServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockHttpServer {
    pub async fn start(status: u16, body: &str) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = HttpState {
            status: StatusCode::from_u16(status).unwrap(),
            body: Arc::new(body.to_string()),
            requests: Arc::clone(&requests),
        };
        let app = Router::new().fallback(record_request).with_state(state);

        let (addr, shutdown_tx) = spawn_server(app).await;
        Self {
            addr,
            requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn record_request(
    State(state): State<HttpState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    (
        state.status,
        [(header::CONTENT_TYPE, "application/json")],
        state.body.as_str().to_string(),
    )
}

/// One outbound message captured by `RecordingMessenger`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub body: String,
}

/// Messenger that records instead of sending
#[derive(Clone, Default)]
pub struct RecordingMessenger {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    failing: bool,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send errors (after recording the attempt)
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.body).collect()
    }

    /// Wait until at least `count` messages were sent (spawned sends)
    pub async fn wait_for(&self, count: usize) -> Vec<SentMessage> {
        for _ in 0..200 {
            if self.sent.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        self.sent()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, to: &str, body: &str) -> Result<()> {
        self.sent.lock().unwrap().push(SentMessage {
            to: to.to_string(),
            body: body.to_string(),
        });
        if self.failing {
            return Err(Error::Channel("recording messenger set to fail".into()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// OCR returning a fixed text, or failing
#[derive(Clone)]
pub struct ScriptedOcr {
    text: Option<String>,
}

impl ScriptedOcr {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { text: None }
    }
}

#[async_trait]
impl TextRecognizer for ScriptedOcr {
    async fn extract_text(&self, _image_url: &str) -> Result<String> {
        self.text
            .clone()
            .ok_or_else(|| Error::Channel("scripted OCR failure".into()))
    }
}

/// Image store keeping uploads in memory
#[derive(Clone, Default)]
pub struct MemoryImageStore {
    uploads: Arc<Mutex<Vec<Vec<u8>>>>,
    failing: bool,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<Vec<u8>> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn upload(&self, bytes: &[u8], _content_type: &str) -> Result<String> {
        if self.failing {
            return Err(Error::Channel("memory store set to fail".into()));
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(bytes.to_vec());
        Ok(format!("memory://images/{}", uploads.len()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Media fetcher returning fixed bytes
#[derive(Clone)]
pub struct StaticFetcher {
    bytes: Option<Vec<u8>>,
}

impl StaticFetcher {
    pub fn bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: Some(bytes.to_vec()),
        }
    }

    pub fn failing() -> Self {
        Self { bytes: None }
    }
}

#[async_trait]
impl MediaFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
        self.bytes
            .clone()
            .ok_or_else(|| Error::Channel("static fetcher set to fail".into()))
    }
}

/// Always-the-same coin
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub bool);

impl RandomSource for FixedRandom {
    fn chance(&self, _p: f64) -> bool {
        self.0
    }
}

/// Clock moved by hand
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(at),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap() = at;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Link issuer handing out a predictable link
pub struct FixedLinkIssuer {
    base: Option<String>,
}

impl FixedLinkIssuer {
    pub fn new(base: &str) -> Self {
        Self {
            base: Some(base.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { base: None }
    }
}

impl LoginLinkIssuer for FixedLinkIssuer {
    fn issue(&self, phone: &str) -> Result<String> {
        let base = self
            .base
            .as_deref()
            .ok_or_else(|| Error::Config("no signing secret".into()))?;
        Ok(format!("{}/dashboard?token=test-{}", base, phone.trim_start_matches('+')))
    }

    fn ttl_minutes(&self) -> i64 {
        15
    }
}

/// Fakes for every channel, with handles kept for assertions
#[derive(Clone)]
pub struct TestChannels {
    pub messenger: RecordingMessenger,
    pub images: MemoryImageStore,
    pub ocr: ScriptedOcr,
    pub media: StaticFetcher,
    pub tip: bool,
}

impl Default for TestChannels {
    fn default() -> Self {
        Self {
            messenger: RecordingMessenger::new(),
            images: MemoryImageStore::new(),
            ocr: ScriptedOcr::text(""),
            media: StaticFetcher::bytes(b"\xff\xd8\xff\xe0 fake jpeg"),
            tip: false,
        }
    }
}

impl TestChannels {
    pub fn channels(&self) -> Channels {
        Channels {
            messenger: Arc::new(self.messenger.clone()),
            media: Arc::new(self.media.clone()),
            images: Arc::new(self.images.clone()),
            ocr: Arc::new(self.ocr.clone()),
            random: Arc::new(FixedRandom(self.tip)),
        }
    }
}
