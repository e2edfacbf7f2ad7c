//! HTTP test utilities for the face service integration tests.
//!
//! Provides a test app builder that mirrors the production router setup for
//! either role, backed by scripted face analysis and an in-memory store.
#![allow(dead_code)]

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};

use face_fhe_service::{
    app::{build_client_router, build_compute_router},
    cpu::CpuLimiter,
    routes::ComputeState,
    settings::{ServiceRole, Settings},
    test_support::{FakeDetector, FixedExtractor, ProtocolHarness},
};

pub const BOUNDARY: &str = "face-fhe-test-boundary";

/// Builder for creating test routers with configurable auth and collaborators.
pub struct TestAppBuilder {
    settings: Settings,
    detector: FakeDetector,
    extractor: FixedExtractor,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppBuilder {
    /// A live, centered face and a seeded 64-value embedding.
    pub fn new() -> Self {
        Self {
            settings: Settings::for_tests(),
            detector: FakeDetector::live_centered(),
            extractor: FixedExtractor::seeded(1),
        }
    }

    /// Configure authentication token requirement.
    pub fn with_auth(mut self, token: &str) -> Self {
        self.settings = self.settings.with_internal_token(Some(token.to_string()));
        self
    }

    pub fn with_detector(mut self, detector: FakeDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_extractor(mut self, extractor: FixedExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_body_limit_bytes(mut self, bytes: usize) -> Self {
        self.settings = self.settings.with_body_limit_bytes(bytes);
        self
    }

    /// Client-role router whose compute side runs in process.
    pub fn build_client(self) -> (Router, ProtocolHarness) {
        let harness = ProtocolHarness::new(self.detector, self.extractor);
        let router = build_client_router(&self.settings, harness.protocol().clone());
        (router, harness)
    }

    /// Compute-role router over the harness's public context and store.
    pub fn build_compute(self) -> (Router, ProtocolHarness) {
        let settings = self.settings.with_role(ServiceRole::Compute);
        let harness = ProtocolHarness::new(self.detector, self.extractor);
        let state = ComputeState::new(
            harness.scorer().clone(),
            CpuLimiter::new(4, Duration::from_secs(60)),
        );
        (build_compute_router(&settings, state), harness)
    }
}

/// Create a client router without authentication.
pub fn test_app() -> Router {
    TestAppBuilder::new().build_client().0
}

/// Create a client router with authentication required.
pub fn test_app_with_auth(token: &str) -> Router {
    TestAppBuilder::new().with_auth(token).build_client().0
}

/// One multipart part.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a [u8]),
}

/// Encode `parts` as a `multipart/form-data` body.
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"upload.bin\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// POST a multipart form to `uri`.
pub fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

/// Helper to parse JSON response body.
pub async fn parse_json_body(response: Response) -> serde_json::Value {
    use http_body_util::BodyExt;

    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// Helper to get response status and body as string (for debugging).
pub async fn response_debug(response: Response) -> (StatusCode, String) {
    use http_body_util::BodyExt;

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&body).to_string();
    (status, text)
}
