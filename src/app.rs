//! Router construction for the two service roles.

use axum::{
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    BoxError, Router,
};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    auth::internal_auth,
    error::ServiceError,
    protocol::FaceProtocol,
    routes::{self, client, compute, ComputeState},
    settings::{ServiceRole, Settings},
};

/// User-facing API of the role that holds the secret context.
pub fn build_client_router(settings: &Settings, protocol: FaceProtocol) -> Router {
    let api = Router::new()
        .route("/encrypt", post(client::encrypt))
        .route("/extract-embedding", post(client::extract_embedding))
        .route("/register-face/", post(client::register_face))
        .route("/verify-face/", post(client::verify_face))
        .route("/test-fhe-roundtrip", get(client::fhe_round_trip))
        .with_state(protocol);
    finish(settings, ServiceRole::Client, api)
}

/// Blind-compute API of the role that holds only the public context.
pub fn build_compute_router(settings: &Settings, state: ComputeState) -> Router {
    let api = Router::new()
        .route(
            "/fhe/store-encrypted-embedding/",
            post(compute::store_encrypted_embedding),
        )
        .route(
            "/fhe/verify-with-embedding/",
            post(compute::verify_with_embedding),
        )
        .route("/fhe/compare-embedding/", post(compute::compare_embedding))
        .route("/fhe/test-similarity/", post(compute::test_similarity))
        .with_state(state);
    finish(settings, ServiceRole::Compute, api)
}

fn finish(settings: &Settings, role: ServiceRole, api: Router) -> Router {
    let probes = Router::new()
        .route("/health", get(routes::health))
        .route("/build-info", get(routes::build_info))
        .with_state(role);

    api.merge(probes)
        .layer(middleware::from_fn_with_state(
            settings.internal_token(),
            internal_auth,
        ))
        .layer(DefaultBodyLimit::max(settings.body_limit_bytes()))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_overload))
                .timeout(settings.request_timeout())
                .layer(GlobalConcurrencyLimitLayer::new(settings.concurrency_limit())),
        )
        .layer(TraceLayer::new_for_http())
}

async fn handle_overload(err: BoxError) -> ServiceError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ServiceError::Timeout("request exceeded the configured timeout".to_string())
    } else {
        ServiceError::Internal(err.to_string())
    }
}
