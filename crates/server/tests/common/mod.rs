//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the real router with a
//! mock transformer and an in-memory artifact store, so every endpoint can be
//! exercised in-process without `rembg` installed.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use cutout_core::{
    testing::{MockArtifactStore, MockTransformer},
    ArtifactStore, Config, JobScheduler, QueueConfig, Transformer,
};
use cutout_server::state::AppState;

/// Re-export fixtures for test convenience
pub use cutout_core::testing::fixtures;

/// Multipart boundary used by [`MultipartBody`].
const BOUNDARY: &str = "cutout-test-boundary";

/// Test fixture with mock dependencies.
///
/// Provides the production router backed by:
/// - Background removal engine (MockTransformer)
/// - Upload storage (MockArtifactStore)
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_upload() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture
///         .post_multipart("/remove-bg", MultipartBody::new().png("image", "a.png"))
///         .await;
///
///     assert_eq!(response.status, StatusCode::OK);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock engine - control delay and failures
    pub transformer: MockTransformer,
    /// Mock store - check artifact cleanup
    pub store: MockArtifactStore,
    /// Scheduler behind the router
    pub scheduler: Arc<JobScheduler>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// Parse the body as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("Response body is not JSON")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestFixture {
    /// Create a fixture with default limits and no pacing.
    pub async fn new() -> Self {
        Self::with_config(Config {
            queue: QueueConfig::default().with_pacing_delay(std::time::Duration::ZERO),
            ..Config::default()
        })
        .await
    }

    /// Create a fixture with custom configuration.
    pub async fn with_config(config: Config) -> Self {
        let transformer = MockTransformer::new();
        let store = MockArtifactStore::new();

        let scheduler = Arc::new(JobScheduler::new(
            config.queue.clone(),
            Arc::new(transformer.clone()) as Arc<dyn Transformer>,
            Arc::new(store.clone()) as Arc<dyn ArtifactStore>,
        ));

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&scheduler),
            Arc::new(store.clone()),
        ));
        let router = cutout_server::api::create_router(state);

        Self {
            router,
            transformer,
            store,
            scheduler,
        }
    }

    /// Send a GET request.
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .expect("Failed to build request");
        send(self.router.clone(), request).await
    }

    /// Send a POST request with a multipart body.
    pub async fn post_multipart(&self, path: &str, body: MultipartBody) -> TestResponse {
        send(self.router.clone(), body.into_request(path)).await
    }

    /// Send a multipart upload in the background, for concurrency tests.
    pub fn spawn_upload(&self, body: MultipartBody) -> tokio::task::JoinHandle<TestResponse> {
        let router = self.router.clone();
        tokio::spawn(async move { send(router, body.into_request("/remove-bg")).await })
    }
}

/// Run one request through the router.
pub async fn send(router: Router, request: Request<Body>) -> TestResponse {
    let response = router.oneshot(request).await.expect("Router error");
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();

    TestResponse {
        status,
        headers,
        body,
    }
}

/// Minimal multipart/form-data builder.
#[derive(Debug, Default, Clone)]
pub struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file part.
    pub fn file(mut self, field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, field, file_name, content_type
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    /// Add the tiny PNG fixture as a file part.
    pub fn png(self, field: &str, file_name: &str) -> Self {
        self.file(field, file_name, "image/png", fixtures::TINY_PNG)
    }

    /// Add a text part.
    pub fn text(mut self, field: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, field, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn into_request(mut self, path: &str) -> Request<Body> {
        self.bytes
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri(path)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(self.bytes))
            .expect("Failed to build request")
    }
}
