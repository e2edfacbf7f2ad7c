//! Health and build-info endpoints, served by both roles.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::settings::ServiceRole;

const SERVICE_NAME: &str = "face-fhe-service";

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    service: String,
    role: String,
}

pub async fn health(State(role): State<ServiceRole>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        role: role.to_string(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfoResponse {
    service: String,
    version: String,
    git_sha: String,
    build_time: String,
}

/// Build info endpoint for deployment verification.
/// Values are embedded at compile time via build.rs.
pub async fn build_info() -> Json<BuildInfoResponse> {
    Json(BuildInfoResponse {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_sha: env!("GIT_SHA").to_string(),
        build_time: env!("BUILD_TIME").to_string(),
    })
}
