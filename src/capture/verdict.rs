use serde::Serialize;

/// Why an image was uploaded. Only changes how rejections are phrased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Enrollment,
    Verification,
    /// Raw embedding extraction outside both protocols.
    Extraction,
}

impl Purpose {
    fn noun(self) -> &'static str {
        match self {
            Purpose::Enrollment => "registration",
            Purpose::Verification => "verification",
            Purpose::Extraction => "embedding extraction",
        }
    }
}

/// Gates of the capture state machine, in the order they are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStage {
    Readable,
    Detected,
    Complete,
    Live,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    UnreadableImage,
    NoFaceDetected,
    Incomplete(String),
    SpoofSuspected,
}

impl Rejection {
    /// The gate that emits this rejection.
    pub fn stage(&self) -> CaptureStage {
        match self {
            Rejection::UnreadableImage => CaptureStage::Readable,
            Rejection::NoFaceDetected => CaptureStage::Detected,
            Rejection::Incomplete(_) => CaptureStage::Complete,
            Rejection::SpoofSuspected => CaptureStage::Live,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Rejection::UnreadableImage => "UNREADABLE_IMAGE",
            Rejection::NoFaceDetected => "NO_FACE_DETECTED",
            Rejection::Incomplete(_) => "INCOMPLETE_FACE",
            Rejection::SpoofSuspected => "SPOOF_SUSPECTED",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Rejection::Incomplete(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn message(&self, purpose: Purpose) -> String {
        match self {
            Rejection::UnreadableImage => format!(
                "Failed to read image for {}. Please upload a valid image file.",
                purpose.noun()
            ),
            Rejection::NoFaceDetected => "No face detected in the image. Please ensure your face \
                is clearly visible and try again."
                .to_string(),
            Rejection::Incomplete(reason) => format!(
                "Incomplete face detected: {reason}. Please ensure your entire face is visible \
                 and centered in the frame."
            ),
            Rejection::SpoofSuspected => format!(
                "Potential spoofing detected. Please use a real face for {}.",
                purpose.noun()
            ),
        }
    }
}
