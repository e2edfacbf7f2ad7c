use axum::body::Bytes;
use rand::Rng;
use serde::Serialize;
use tracing::info;

use super::decision::{decide, decrypt_entry, VerificationOutcome};
use super::FaceProtocol;
use crate::capture::Purpose;
use crate::embedding::FeatureVector;
use crate::error::ServiceResult;

/// Result of the encrypt, compute, decrypt self-test.
#[derive(Debug, Clone, Serialize)]
pub struct RoundTripReport {
    pub decrypted: f64,
    pub expected: f64,
    pub error: f64,
}

impl FaceProtocol {
    /// Verify a probe image against the enrolled templates.
    #[tracing::instrument(skip(self, bytes), fields(image_bytes = bytes.len()))]
    pub async fn verify(
        &self,
        session_id: Option<&str>,
        bytes: Bytes,
    ) -> ServiceResult<VerificationOutcome> {
        let probe = self.capture_and_encrypt(bytes, Purpose::Verification).await?;
        let sheet = self.compute.score(session_id, &probe).await?;

        let context = self.context.clone();
        let threshold = self.threshold;
        let outcome = self
            .cpu
            .run(move || {
                let results = sheet
                    .results
                    .into_iter()
                    .map(|entry| decrypt_entry(&context, entry))
                    .collect();
                Ok(decide(results, threshold))
            })
            .await?;

        info!(
            candidates = outcome.results.len(),
            match_found = outcome.match_found,
            best_match = ?outcome.best_match.as_ref().map(|m| m.user_id.as_str()),
            "Verification finished"
        );
        Ok(outcome)
    }

    /// Encrypt a random vector, let blind compute take its inner product
    /// with itself, decrypt and compare with the plaintext answer.
    pub async fn round_trip(&self) -> ServiceResult<RoundTripReport> {
        let dim = self.context.params().vector_dim();
        let values: Vec<f64> = {
            let mut rng = rand::thread_rng();
            (0..dim).map(|_| rng.gen::<f32>() as f64).collect()
        };
        let vector = FeatureVector::new(values);
        let expected = vector.dot(&vector);

        let encrypted = self.encrypt(vector).await?;
        let result = self.compute.self_similarity(&encrypted).await?;

        let context = self.context.clone();
        let decrypted = self
            .cpu
            .run(move || result.link(&context)?.decrypt_scalar())
            .await?;
        info!("Round trip decrypted {decrypted:.6}, expected {expected:.6}");

        Ok(RoundTripReport {
            decrypted,
            expected,
            error: (decrypted - expected).abs(),
        })
    }
}
