//! Client-role endpoints: capture, encrypt, and decide.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use super::form::FormUpload;
use crate::embedding::FeatureVector;
use crate::error::{ServiceError, ServiceResult};
use crate::protocol::{FaceProtocol, RoundTripReport, VerificationOutcome};
use crate::store::StoreAck;

#[derive(Serialize)]
pub struct EncryptResponse {
    /// Base64 of the serialized ciphertext.
    encrypted: String,
}

/// POST /encrypt
///
/// Encrypt a raw packed-f32 embedding as uploaded. No normalization.
#[tracing::instrument(skip_all)]
pub async fn encrypt(
    State(protocol): State<FaceProtocol>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServiceResult<Json<EncryptResponse>> {
    let mut form = FormUpload::read(multipart).await?;
    let bytes = form.take_file()?;
    let vector = FeatureVector::from_f32_le_bytes(&bytes).map_err(ServiceError::InvalidInput)?;
    let encrypted = protocol.encrypt(vector).await?;

    Ok(Json(EncryptResponse {
        encrypted: encrypted.to_base64()?,
    }))
}

#[derive(Serialize)]
pub struct ExtractEmbeddingResponse {
    embedding: FeatureVector,
}

/// POST /extract-embedding
#[tracing::instrument(skip_all)]
pub async fn extract_embedding(
    State(protocol): State<FaceProtocol>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServiceResult<Json<ExtractEmbeddingResponse>> {
    let mut form = FormUpload::read(multipart).await?;
    let embedding = protocol.extract_embedding(form.take_file()?).await?;
    Ok(Json(ExtractEmbeddingResponse { embedding }))
}

/// POST /register-face/
#[tracing::instrument(skip_all)]
pub async fn register_face(
    State(protocol): State<FaceProtocol>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServiceResult<Json<StoreAck>> {
    let mut form = FormUpload::read(multipart).await?;
    let bytes = form.take_file()?;
    let user_id = form.require_text("user_id")?;
    let ack = protocol
        .enroll(user_id, form.text("full_name"), bytes)
        .await?;
    Ok(Json(ack))
}

/// POST /verify-face/
///
/// Requests without a `session_id` get a fresh one so both roles log the
/// same correlation id.
#[tracing::instrument(skip_all, fields(session_id = tracing::field::Empty))]
pub async fn verify_face(
    State(protocol): State<FaceProtocol>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServiceResult<Json<VerificationOutcome>> {
    let mut form = FormUpload::read(multipart).await?;
    let bytes = form.take_file()?;
    let session_id = form
        .text("session_id")
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    tracing::Span::current().record("session_id", session_id.as_str());

    let outcome = protocol.verify(Some(&session_id), bytes).await?;
    Ok(Json(outcome))
}

/// GET /test-fhe-roundtrip
pub async fn fhe_round_trip(
    State(protocol): State<FaceProtocol>,
) -> ServiceResult<Json<RoundTripReport>> {
    Ok(Json(protocol.round_trip().await?))
}
