//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that builds the real router over a
//! pipeline runner wired to mock components, enabling full request flows
//! without yt-dlp, ffmpeg or the catalog API.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use tubetag_core::{
    load_config_from_str, testing::MockPipeline, PipelineRunner, ProgressEvent,
};
use tubetag_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use tubetag_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// Provides an in-process router with fully controllable mocks for:
/// - Metadata and audio extraction (MockExtractor)
/// - Catalog search (MockCatalog)
/// - Cover art (MockArtworkFetcher)
/// - Tagging (MockMuxer)
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_start_run() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/runs", json!({
///         "source": "https://youtu.be/abc"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock pipeline components
    pub mocks: MockPipeline,
    /// Runner behind the router
    pub runner: Arc<PipelineRunner>,
    /// Work directory holding per-run directories
    pub work_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Response whose body is kept as raw bytes
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub bytes: Vec<u8>,
}

const TEST_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 0

[catalog.spotify]
client_id = "test-client"
client_secret = "test-secret"

[tools]
auto_install = false
"#;

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub fn new() -> Self {
        let work_dir = TempDir::new().expect("Failed to create work dir");
        let mocks = MockPipeline::new();

        let mut config = load_config_from_str(TEST_CONFIG).expect("test config parses");
        config.pipeline = fixtures::pipeline_config(work_dir.path());

        let runner = mocks.runner(config.pipeline.clone());
        let state = Arc::new(AppState::new(config, Arc::clone(&runner)));
        let router = create_router(state);

        Self {
            router,
            mocks,
            runner,
            work_dir,
        }
    }

    /// Serve the router on a local port and return its `host:port`.
    pub async fn serve(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().unwrap();
        let router = self.router.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr.to_string()
    }

    /// Directory of a run inside the work dir.
    pub fn run_dir(&self, run_id: &str) -> std::path::PathBuf {
        self.work_dir.path().join(run_id)
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let raw = self.send(request).await;
        TestResponse {
            status: raw.status,
            body: parse_json(&raw.bytes),
        }
    }

    /// Send a GET request and keep the body as bytes.
    pub async fn get_raw(&self, path: &str) -> RawResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Start a run and return its id.
    pub async fn start_run(&self, source: &str) -> String {
        let response = self
            .post("/api/v1/runs", serde_json::json!({ "source": source }))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["run_id"]
            .as_str()
            .expect("run_id in response")
            .to_string()
    }

    /// Wait until the run has published its terminal event.
    pub async fn wait_for_end(&self, run_id: &str) -> ProgressEvent {
        use futures::StreamExt;

        let id = run_id.parse().expect("run id is a uuid");
        let stream = self.runner.subscribe(id).await.expect("run exists");
        let events: Vec<ProgressEvent> =
            tokio::time::timeout(Duration::from_secs(10), stream.collect())
                .await
                .expect("run did not finish in time");
        events.last().cloned().expect("at least one event")
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let raw = self.send(request_builder.body(body).unwrap()).await;
        TestResponse {
            status: raw.status,
            body: parse_json(&raw.bytes),
        }
    }

    async fn send(&self, request: Request<Body>) -> RawResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let header = |name: axum::http::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(axum::http::header::CONTENT_TYPE);
        let content_disposition = header(axum::http::header::CONTENT_DISPOSITION);

        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        RawResponse {
            status,
            content_type,
            content_disposition,
            bytes,
        }
    }
}

fn parse_json(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(bytes).unwrap_or(Value::Null)
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
