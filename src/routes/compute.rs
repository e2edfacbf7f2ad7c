//! Compute-role endpoints. Everything here runs under the public context;
//! results go back still encrypted.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::info;

use super::form::FormUpload;
use crate::compute::{BlindScorer, ScoreSheet};
use crate::cpu::CpuLimiter;
use crate::error::ServiceResult;
use crate::store::StoreAck;

#[derive(Clone)]
pub struct ComputeState {
    scorer: BlindScorer,
    cpu: CpuLimiter,
}

impl ComputeState {
    pub fn new(scorer: BlindScorer, cpu: CpuLimiter) -> Self {
        Self { scorer, cpu }
    }

    pub fn scorer(&self) -> &BlindScorer {
        &self.scorer
    }
}

/// POST /fhe/store-encrypted-embedding/
#[tracing::instrument(skip_all)]
pub async fn store_encrypted_embedding(
    State(state): State<ComputeState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServiceResult<Json<StoreAck>> {
    let mut form = FormUpload::read(multipart).await?;
    let bytes = form.take_file()?;
    let user_id = form.require_text("user_id")?.to_string();
    let full_name = form.text("full_name").map(str::to_string);

    let scorer = state.scorer.clone();
    let ack = state
        .cpu
        .run(move || scorer.register(&user_id, full_name.as_deref(), &bytes))
        .await?;
    info!(user_id = %ack.user_id, "Encrypted template stored");
    Ok(Json(ack))
}

/// POST /fhe/verify-with-embedding/
#[tracing::instrument(skip_all)]
pub async fn verify_with_embedding(
    State(state): State<ComputeState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServiceResult<Json<ScoreSheet>> {
    let mut form = FormUpload::read(multipart).await?;
    let bytes = form.take_file()?;
    let session_id = form.text("session_id").map(str::to_string);

    let scorer = state.scorer.clone();
    let sheet = state.cpu.run(move || scorer.score_bytes(&bytes)).await?;
    info!(
        session_id = ?session_id,
        candidates = sheet.results.len(),
        "Blind scoring finished"
    );
    Ok(Json(sheet))
}

#[derive(Serialize)]
pub struct CompareResponse {
    enc_distance: String,
}

/// POST /fhe/compare-embedding/
#[tracing::instrument(skip_all)]
pub async fn compare_embedding(
    State(state): State<ComputeState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServiceResult<Json<CompareResponse>> {
    let mut form = FormUpload::read(multipart).await?;
    let bytes = form.take_file()?;
    let user_id = form.require_text("user_id")?.to_string();

    let scorer = state.scorer.clone();
    let distance = state
        .cpu
        .run(move || scorer.compare_bytes(&user_id, &bytes))
        .await?;
    Ok(Json(CompareResponse {
        enc_distance: distance.to_base64()?,
    }))
}

#[derive(Serialize)]
pub struct SelfSimilarityResponse {
    result: String,
}

/// POST /fhe/test-similarity/
#[tracing::instrument(skip_all)]
pub async fn test_similarity(
    State(state): State<ComputeState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServiceResult<Json<SelfSimilarityResponse>> {
    let mut form = FormUpload::read(multipart).await?;
    let bytes = form.take_file()?;

    let scorer = state.scorer.clone();
    let result = state
        .cpu
        .run(move || scorer.self_similarity_bytes(&bytes))
        .await?;
    Ok(Json(SelfSimilarityResponse {
        result: result.to_base64()?,
    }))
}
