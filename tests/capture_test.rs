//! Capture validator state machine: each gate runs only after the previous
//! one passed, and the first failing gate decides the rejection.

use std::sync::Arc;

use face_fhe_service::analysis::{AnalyzerError, FaceRegion};
use face_fhe_service::capture::{
    CaptureOutcome, CapturePolicy, CaptureStage, CaptureValidator, Rejection,
};
use face_fhe_service::test_support::{detection, images, FakeDetector, CENTERED_FACE};

fn validator(detector: &Arc<FakeDetector>) -> CaptureValidator {
    CaptureValidator::new(detector.clone(), CapturePolicy::default())
}

async fn rejection_for(detector: FakeDetector) -> (Rejection, Arc<FakeDetector>) {
    let detector = Arc::new(detector);
    let outcome = validator(&detector)
        .validate(images::png_bytes(200, 200))
        .await
        .unwrap();
    match outcome {
        CaptureOutcome::Rejected(rejection) => (rejection, detector),
        CaptureOutcome::Accepted(_) => panic!("capture should have been rejected"),
    }
}

#[tokio::test]
async fn no_face_stops_before_liveness() {
    let (rejection, detector) = rejection_for(FakeDetector::no_face()).await;
    assert_eq!(rejection, Rejection::NoFaceDetected);
    assert_eq!(rejection.stage(), CaptureStage::Detected);
    assert_eq!(detector.calls(), 1);
    assert_eq!(detector.anti_spoofing_calls(), 0);
}

#[tokio::test]
async fn empty_detection_list_is_no_face() {
    let (rejection, _) = rejection_for(FakeDetector::new(Ok(vec![]), Ok(vec![]))).await;
    assert_eq!(rejection, Rejection::NoFaceDetected);
}

#[tokio::test]
async fn zero_area_boxes_are_skipped() {
    let degenerate = FaceRegion {
        x: 10,
        y: 10,
        width: 0,
        height: 50,
    };
    let detector = Arc::new(FakeDetector::new(
        Ok(vec![detection(degenerate, None), detection(CENTERED_FACE, None)]),
        Ok(vec![detection(CENTERED_FACE, Some(true))]),
    ));

    let outcome = validator(&detector)
        .validate(images::png_bytes(200, 200))
        .await
        .unwrap();
    assert!(matches!(outcome, CaptureOutcome::Accepted(_)));
}

#[tokio::test]
async fn incomplete_face_never_reaches_liveness() {
    let beyond = FaceRegion {
        x: 150,
        y: 40,
        width: 100,
        height: 120,
    };
    let (rejection, detector) = rejection_for(FakeDetector::with_region(beyond, true)).await;
    assert_eq!(
        rejection,
        Rejection::Incomplete("face extends beyond the image frame".to_string())
    );
    assert_eq!(detector.anti_spoofing_calls(), 0);
}

#[tokio::test]
async fn squashed_face_fails_the_ratio_check() {
    let squashed = FaceRegion {
        x: 20,
        y: 80,
        width: 160,
        height: 40,
    };
    let (rejection, _) = rejection_for(FakeDetector::with_region(squashed, true)).await;
    let reason = rejection.reason().unwrap();
    assert!(reason.contains("ratio 4.00"), "{reason}");
}

#[tokio::test]
async fn spoof_is_rejected_at_the_last_gate() {
    let (rejection, detector) = rejection_for(FakeDetector::spoof_centered()).await;
    assert_eq!(rejection, Rejection::SpoofSuspected);
    assert_eq!(rejection.stage(), CaptureStage::Live);
    assert_eq!(detector.anti_spoofing_calls(), 1);
}

#[tokio::test]
async fn face_lost_in_liveness_pass_is_a_spoof() {
    let detector = FakeDetector::new(
        Ok(vec![detection(CENTERED_FACE, None)]),
        Err(AnalyzerError::NoFace),
    );
    let (rejection, _) = rejection_for(detector).await;
    assert_eq!(rejection, Rejection::SpoofSuspected);
}

#[tokio::test]
async fn unknown_liveness_is_not_live() {
    let detector = FakeDetector::new(
        Ok(vec![detection(CENTERED_FACE, None)]),
        Ok(vec![detection(CENTERED_FACE, None)]),
    );
    let (rejection, _) = rejection_for(detector).await;
    assert_eq!(rejection, Rejection::SpoofSuspected);
}

#[tokio::test]
async fn any_real_face_passes_liveness() {
    let detector = Arc::new(FakeDetector::new(
        Ok(vec![detection(CENTERED_FACE, None)]),
        Ok(vec![
            detection(CENTERED_FACE, Some(false)),
            detection(CENTERED_FACE, Some(true)),
        ]),
    ));

    let outcome = validator(&detector)
        .validate(images::png_bytes(200, 200))
        .await
        .unwrap();
    assert!(matches!(outcome, CaptureOutcome::Accepted(_)));
}

#[tokio::test]
async fn accepted_capture_exposes_a_temp_file_until_dropped() {
    let detector = Arc::new(FakeDetector::live_centered());
    let outcome = validator(&detector)
        .validate(images::png_bytes(200, 200))
        .await
        .unwrap();
    let CaptureOutcome::Accepted(image) = outcome else {
        panic!("capture should have been accepted");
    };

    let path = image.path().to_path_buf();
    assert!(path.exists());
    assert_eq!((image.width(), image.height()), (200, 200));
    drop(image);
    assert!(!path.exists());
}
