//! Capture Validator.
//!
//! An uploaded image passes four gates in order: it must decode, contain a
//! usable face, show that face completely and look live. The first failing
//! gate decides the verdict and later gates never run. One validator serves
//! both enrollment and verification; only the wording of rejections differs.

mod geometry;
mod image;
mod verdict;

use std::sync::Arc;

use axum::body::Bytes;
use tracing::{debug, info};

use crate::analysis::{AnalyzerError, DetectOptions, Detection, FaceDetector};
use crate::error::{ServiceError, ServiceResult};

pub use self::image::{CaptureImage, ImageLoadError};
pub use verdict::{CaptureStage, Purpose, Rejection};

pub const DEFAULT_EDGE_MARGIN: f64 = 0.02;
pub const DEFAULT_MIN_ASPECT: f64 = 0.5;
pub const DEFAULT_MAX_ASPECT: f64 = 1.6;

/// Tunables for the completeness and liveness gates.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturePolicy {
    edge_margin: f64,
    min_aspect: f64,
    max_aspect: f64,
    single_pass: bool,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            edge_margin: DEFAULT_EDGE_MARGIN,
            min_aspect: DEFAULT_MIN_ASPECT,
            max_aspect: DEFAULT_MAX_ASPECT,
            single_pass: false,
        }
    }
}

impl CapturePolicy {
    pub fn new(edge_margin: f64, min_aspect: f64, max_aspect: f64, single_pass: bool) -> Self {
        Self {
            edge_margin,
            min_aspect,
            max_aspect,
            single_pass,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..0.5).contains(&self.edge_margin) {
            return Err(format!(
                "CAPTURE_EDGE_MARGIN must be in [0, 0.5), got {}",
                self.edge_margin
            ));
        }
        if !(self.min_aspect > 0.0 && self.min_aspect <= self.max_aspect) {
            return Err(format!(
                "CAPTURE_MIN_ASPECT ({}) must be positive and not above CAPTURE_MAX_ASPECT ({})",
                self.min_aspect, self.max_aspect
            ));
        }
        Ok(())
    }

    pub fn edge_margin(&self) -> f64 {
        self.edge_margin
    }

    pub fn min_aspect(&self) -> f64 {
        self.min_aspect
    }

    pub fn max_aspect(&self) -> f64 {
        self.max_aspect
    }

    pub fn single_pass(&self) -> bool {
        self.single_pass
    }

    pub fn with_single_pass(mut self, single_pass: bool) -> Self {
        self.single_pass = single_pass;
        self
    }
}

#[derive(Debug)]
pub enum CaptureOutcome {
    Accepted(CaptureImage),
    Rejected(Rejection),
}

#[derive(Clone)]
pub struct CaptureValidator {
    detector: Arc<dyn FaceDetector>,
    policy: CapturePolicy,
}

impl CaptureValidator {
    pub fn new(detector: Arc<dyn FaceDetector>, policy: CapturePolicy) -> Self {
        Self { detector, policy }
    }

    pub fn policy(&self) -> &CapturePolicy {
        &self.policy
    }

    /// Run the gates. `Err` means a collaborator or the host failed, not
    /// that the capture was rejected.
    pub async fn validate(&self, bytes: Bytes) -> ServiceResult<CaptureOutcome> {
        // Readable
        let decoded = tokio::task::spawn_blocking(move || CaptureImage::decode(bytes)).await?;
        let image = match decoded {
            Ok(image) => image,
            Err(ImageLoadError::Undecodable(err)) => {
                debug!("capture rejected: {err}");
                return Ok(CaptureOutcome::Rejected(Rejection::UnreadableImage));
            }
            Err(ImageLoadError::Io(err)) => return Err(err.into()),
        };

        // Detected
        let options = DetectOptions {
            anti_spoofing: self.policy.single_pass,
        };
        let faces = match self.detector.detect(&image, options).await {
            Ok(faces) => faces,
            Err(AnalyzerError::NoFace) => {
                return Ok(CaptureOutcome::Rejected(Rejection::NoFaceDetected))
            }
            Err(err) => return Err(err.into()),
        };
        let Some(face) = faces.iter().find(|face| geometry::has_area(&face.region)) else {
            return Ok(CaptureOutcome::Rejected(Rejection::NoFaceDetected));
        };

        // Complete
        if let Err(reason) =
            geometry::check_completeness(&face.region, image.width(), image.height(), &self.policy)
        {
            return Ok(CaptureOutcome::Rejected(Rejection::Incomplete(reason)));
        }

        // Live
        let live = if self.policy.single_pass {
            any_real(&faces)
        } else {
            let options = DetectOptions {
                anti_spoofing: true,
            };
            match self.detector.detect(&image, options).await {
                Ok(faces) => any_real(&faces),
                Err(AnalyzerError::NoFace) => false,
                Err(err) => return Err(err.into()),
            }
        };
        if !live {
            return Ok(CaptureOutcome::Rejected(Rejection::SpoofSuspected));
        }

        Ok(CaptureOutcome::Accepted(image))
    }

    /// [`Self::validate`] with rejections turned into errors phrased for `purpose`.
    #[tracing::instrument(skip(self, bytes), fields(image_bytes = bytes.len()))]
    pub async fn admit(&self, bytes: Bytes, purpose: Purpose) -> ServiceResult<CaptureImage> {
        match self.validate(bytes).await? {
            CaptureOutcome::Accepted(image) => {
                debug!(width = image.width(), height = image.height(), "capture accepted");
                Ok(image)
            }
            CaptureOutcome::Rejected(rejection) => {
                info!(
                    stage = ?rejection.stage(),
                    code = rejection.code(),
                    "capture rejected"
                );
                Err(ServiceError::capture(purpose, rejection))
            }
        }
    }
}

fn any_real(faces: &[Detection]) -> bool {
    faces.iter().any(|face| face.is_real == Some(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{images, FakeDetector};

    fn validator(detector: Arc<FakeDetector>, single_pass: bool) -> CaptureValidator {
        CaptureValidator::new(
            detector,
            CapturePolicy::default().with_single_pass(single_pass),
        )
    }

    #[tokio::test]
    async fn unreadable_bytes_never_reach_the_detector() {
        let detector = Arc::new(FakeDetector::live_centered());
        let outcome = validator(detector.clone(), false)
            .validate(Bytes::from_static(b"not an image"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CaptureOutcome::Rejected(Rejection::UnreadableImage)
        ));
        assert_eq!(detector.calls(), 0);
    }

    #[tokio::test]
    async fn live_centered_face_is_accepted_after_two_passes() {
        let detector = Arc::new(FakeDetector::live_centered());
        let outcome = validator(detector.clone(), false)
            .validate(images::png_bytes(200, 200))
            .await
            .unwrap();
        assert!(matches!(outcome, CaptureOutcome::Accepted(_)));
        assert_eq!(detector.calls(), 2);
        assert_eq!(detector.anti_spoofing_calls(), 1);
    }

    #[tokio::test]
    async fn single_pass_reuses_the_first_detection() {
        let detector = Arc::new(FakeDetector::live_centered());
        let outcome = validator(detector.clone(), true)
            .validate(images::png_bytes(200, 200))
            .await
            .unwrap();
        assert!(matches!(outcome, CaptureOutcome::Accepted(_)));
        assert_eq!(detector.calls(), 1);
        assert_eq!(detector.anti_spoofing_calls(), 1);
    }

    #[tokio::test]
    async fn backend_failure_is_an_error_not_a_verdict() {
        let detector = Arc::new(FakeDetector::failing("model not loaded"));
        let result = validator(detector, false)
            .validate(images::png_bytes(200, 200))
            .await;
        assert!(matches!(result, Err(ServiceError::UpstreamFailure(_))));
    }

    #[tokio::test]
    async fn rejection_is_phrased_for_the_purpose() {
        let detector = Arc::new(FakeDetector::spoof_centered());
        let err = validator(detector, false)
            .admit(images::png_bytes(200, 200), Purpose::Enrollment)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "SPOOF_SUSPECTED");
        assert!(err.to_string().ends_with("for registration."));
    }
}
