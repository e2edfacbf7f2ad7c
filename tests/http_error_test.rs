//! Error handling tests: malformed input and the shape of error bodies.

mod http;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use face_fhe_service::analysis::AnalyzerError;
use face_fhe_service::test_support::{images, FakeDetector, FixedExtractor};
use http::Part;
use tower::ServiceExt;

/// Missing file part is a 400 with a JSON body.
#[tokio::test]
async fn missing_file_is_invalid_input() {
    let app = http::test_app();

    let response = app
        .oneshot(http::multipart_request(
            "/verify-face/",
            &[Part::Text("session_id", "s-1")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = http::parse_json_body(response).await;
    assert_eq!(json["code"], "INVALID_INPUT");
    assert!(json["error"].as_str().unwrap().contains("file"));
}

/// Non-multipart bodies are rejected as invalid input, still as JSON.
#[tokio::test]
async fn non_multipart_body_is_invalid_input() {
    let app = http::test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/register-face/")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = http::parse_json_body(response).await;
    assert_eq!(json["code"], "INVALID_INPUT");
}

/// Registration without a user id never touches the analyzer.
#[tokio::test]
async fn register_requires_user_id() {
    let (app, harness) = http::TestAppBuilder::new().build_client();
    let image = images::png_bytes(200, 200);

    let response = app
        .oneshot(http::multipart_request(
            "/register-face/",
            &[Part::Text("user_id", "  "), Part::File("file", &image)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.detector().calls(), 0);
}

/// Bytes that are not an image are an unreadable capture.
#[tokio::test]
async fn unreadable_image_is_a_capture_rejection() {
    let app = http::test_app();

    let response = app
        .oneshot(http::multipart_request(
            "/verify-face/",
            &[Part::File("file", b"definitely not a png")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = http::parse_json_body(response).await;
    assert_eq!(json["code"], "UNREADABLE_IMAGE");
}

/// Analyzer outages are upstream failures, not capture rejections.
#[tokio::test]
async fn analyzer_failure_is_server_error() {
    let (app, _harness) = http::TestAppBuilder::new()
        .with_detector(FakeDetector::failing("model server down"))
        .build_client();
    let image = images::png_bytes(200, 200);

    let response = app
        .oneshot(http::multipart_request(
            "/verify-face/",
            &[Part::File("file", &image)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = http::parse_json_body(response).await;
    assert_eq!(json["code"], "UPSTREAM_FAILURE");
}

/// Analyzer timeouts are a 500 distinguished by their code.
#[tokio::test]
async fn extractor_timeout_is_server_error_with_timeout_code() {
    let (app, _harness) = http::TestAppBuilder::new()
        .with_extractor(FixedExtractor::failing(AnalyzerError::Timeout(
            "30s elapsed".into(),
        )))
        .build_client();
    let image = images::png_bytes(200, 200);

    let response = app
        .oneshot(http::multipart_request(
            "/register-face/",
            &[Part::Text("user_id", "alice"), Part::File("file", &image)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = http::parse_json_body(response).await;
    assert_eq!(json["code"], "UPSTREAM_TIMEOUT");
}

/// Garbage ciphertext uploaded to the compute role is a 400.
#[tokio::test]
async fn malformed_ciphertext_is_bad_request() {
    let (app, _harness) = http::TestAppBuilder::new().build_compute();

    let response = app
        .oneshot(http::multipart_request(
            "/fhe/verify-with-embedding/",
            &[Part::File("file", b"\x01\x02\x03")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = http::parse_json_body(response).await;
    assert_eq!(json["code"], "MALFORMED_CIPHERTEXT");
}

/// Bodies above the configured limit are refused.
#[tokio::test]
async fn oversized_upload_is_rejected() {
    let (app, _harness) = http::TestAppBuilder::new()
        .with_body_limit_bytes(1024)
        .build_client();
    let big = vec![0u8; 4096];

    let response = app
        .oneshot(http::multipart_request(
            "/verify-face/",
            &[Part::File("file", &big)],
        ))
        .await
        .unwrap();

    assert!(
        response.status() == StatusCode::PAYLOAD_TOO_LARGE
            || response.status() == StatusCode::BAD_REQUEST,
        "{}",
        response.status()
    );
}
