//! Enrollment and verification, built on one shared capture-and-encrypt
//! pipeline.
//!
//! Both protocols gate the upload with the [`CaptureValidator`], extract an
//! embedding, normalize it to unit length and encrypt it under the secret
//! context. Enrollment hands the ciphertext to the template store;
//! verification hands it to blind compute and decrypts what comes back.

mod decision;
mod enrollment;
mod verification;

use std::sync::Arc;

use axum::body::Bytes;
use tracing::info_span;

use crate::analysis::{AnalyzerError, EmbeddingExtractor};
use crate::capture::{CaptureImage, CaptureValidator, ImageLoadError, Purpose, Rejection};
use crate::compute::BlindCompute;
use crate::cpu::CpuLimiter;
use crate::crypto::{self, CryptoContext, EncryptedVector};
use crate::embedding::FeatureVector;
use crate::error::{ServiceError, ServiceResult};
use crate::store::TemplateStore;

pub use decision::{decide, decrypt_entry, SimilarityResult, VerificationOutcome};
pub use verification::RoundTripReport;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.5;

#[derive(Clone)]
pub struct FaceProtocol {
    validator: CaptureValidator,
    extractor: Arc<dyn EmbeddingExtractor>,
    context: CryptoContext,
    store: Arc<dyn TemplateStore>,
    compute: Arc<dyn BlindCompute>,
    threshold: f64,
    cpu: CpuLimiter,
}

impl FaceProtocol {
    pub fn new(
        validator: CaptureValidator,
        extractor: Arc<dyn EmbeddingExtractor>,
        context: CryptoContext,
        store: Arc<dyn TemplateStore>,
        compute: Arc<dyn BlindCompute>,
        cpu: CpuLimiter,
    ) -> Self {
        Self {
            validator,
            extractor,
            context,
            store,
            compute,
            threshold: DEFAULT_MATCH_THRESHOLD,
            cpu,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn context(&self) -> &CryptoContext {
        &self.context
    }

    /// Gate, extract, normalize, encrypt.
    async fn capture_and_encrypt(
        &self,
        bytes: Bytes,
        purpose: Purpose,
    ) -> ServiceResult<EncryptedVector> {
        let image = self.validator.admit(bytes, purpose).await?;
        let embedding = self.extract(&image, purpose).await?;
        drop(image);

        let unit = embedding.normalized().ok_or_else(|| {
            ServiceError::UpstreamFailure("extractor returned a degenerate embedding".to_string())
        })?;
        self.encrypt(unit).await
    }

    async fn extract(&self, image: &CaptureImage, purpose: Purpose) -> ServiceResult<FeatureVector> {
        match self.extractor.extract(image).await {
            Ok(embedding) => Ok(embedding),
            Err(AnalyzerError::NoFace) => {
                Err(ServiceError::capture(purpose, Rejection::NoFaceDetected))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Encrypt `vector` as given, on the CPU pool.
    pub async fn encrypt(&self, vector: FeatureVector) -> ServiceResult<EncryptedVector> {
        let context = self.context.clone();
        self.cpu
            .run(move || {
                let _span = info_span!("encrypt_embedding", dim = vector.len()).entered();
                crypto::encrypt(&context, &vector)
            })
            .await
    }

    /// Raw embedding of an uploaded image. Only the image must decode; the
    /// detector gates do not run.
    #[tracing::instrument(skip(self, bytes), fields(image_bytes = bytes.len()))]
    pub async fn extract_embedding(&self, bytes: Bytes) -> ServiceResult<FeatureVector> {
        let purpose = Purpose::Extraction;
        let image = match tokio::task::spawn_blocking(move || CaptureImage::decode(bytes)).await? {
            Ok(image) => image,
            Err(ImageLoadError::Undecodable(_)) => {
                return Err(ServiceError::capture(purpose, Rejection::UnreadableImage))
            }
            Err(ImageLoadError::Io(err)) => return Err(err.into()),
        };
        self.extract(&image, purpose).await
    }
}
