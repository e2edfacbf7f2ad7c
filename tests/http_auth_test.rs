//! Authentication middleware tests.
//!
//! Every endpoint except /health and /build-info requires the internal token
//! once one is configured.

mod http;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use face_fhe_service::auth::INTERNAL_TOKEN_HEADER;
use tower::ServiceExt;

const TEST_TOKEN: &str = "test-secret-token-12345";

fn round_trip_request(token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/test-fhe-roundtrip");
    if let Some(token) = token {
        builder = builder.header(INTERNAL_TOKEN_HEADER, token);
    }
    builder.body(Body::empty()).unwrap()
}

/// Protected endpoint requires auth when token is configured.
#[tokio::test]
async fn protected_endpoint_requires_auth() {
    let app = http::test_app_with_auth(TEST_TOKEN);

    let response = app.oneshot(round_trip_request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = http::parse_json_body(response).await;
    assert_eq!(json["error"], "Unauthorized");
}

/// Protected endpoint accepts valid token.
#[tokio::test]
async fn protected_endpoint_accepts_valid_token() {
    let app = http::test_app_with_auth(TEST_TOKEN);

    let response = app
        .oneshot(round_trip_request(Some(TEST_TOKEN)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

/// Protected endpoint rejects wrong token.
#[tokio::test]
async fn protected_endpoint_rejects_wrong_token() {
    let app = http::test_app_with_auth(TEST_TOKEN);

    let response = app
        .oneshot(round_trip_request(Some("wrong-token")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Compute role is protected the same way.
#[tokio::test]
async fn compute_endpoint_requires_auth() {
    let (app, _harness) = http::TestAppBuilder::new()
        .with_auth(TEST_TOKEN)
        .build_compute();

    let response = app
        .oneshot(http::multipart_request(
            "/fhe/test-similarity/",
            &[http::Part::File("file", b"ciphertext")],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Health stays reachable without a token.
#[tokio::test]
async fn health_is_public_with_auth_enabled() {
    let app = http::test_app_with_auth(TEST_TOKEN);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

/// No token configured means no check.
#[tokio::test]
async fn no_token_configured_allows_requests() {
    let app = http::test_app();

    let response = app.oneshot(round_trip_request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
