//! Face analysis collaborators: detection (with optional anti-spoof scoring)
//! and embedding extraction.
//!
//! Both run outside this process. [`HttpFaceAnalyzer`] talks to an inference
//! sidecar, [`CommandFaceAnalyzer`] runs a local executable on the capture's
//! temporary file. They share one JSON reply format.

mod command;
mod http;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::CaptureImage;
use crate::embedding::FeatureVector;

pub use command::CommandFaceAnalyzer;
pub use http::HttpFaceAnalyzer;

/// Axis-aligned face box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: i64,
    pub y: i64,
    #[serde(rename = "w")]
    pub width: i64,
    #[serde(rename = "h")]
    pub height: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "facial_area")]
    pub region: FaceRegion,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Present only when the pass ran with anti-spoofing enabled.
    #[serde(default)]
    pub is_real: Option<bool>,
    #[serde(default)]
    pub antispoof_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectOptions {
    pub anti_spoofing: bool,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalyzerError {
    #[error("no face detected")]
    NoFace,

    #[error("face analyzer failed: {0}")]
    Backend(String),

    #[error("face analyzer timed out: {0}")]
    Timeout(String),
}

pub trait FaceDetector: Send + Sync {
    fn detect<'a>(
        &'a self,
        image: &'a CaptureImage,
        options: DetectOptions,
    ) -> BoxFuture<'a, Result<Vec<Detection>, AnalyzerError>>;
}

pub trait EmbeddingExtractor: Send + Sync {
    fn extract<'a>(
        &'a self,
        image: &'a CaptureImage,
    ) -> BoxFuture<'a, Result<FeatureVector, AnalyzerError>>;
}

/// Error object an analyzer returns instead of a result.
#[derive(Debug, Deserialize)]
struct ReplyError {
    kind: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetectReply {
    #[serde(default)]
    faces: Vec<Detection>,
    #[serde(default)]
    error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
struct RepresentReply {
    #[serde(default)]
    embedding: Option<Vec<f64>>,
    #[serde(default)]
    error: Option<ReplyError>,
}

fn reply_error(error: ReplyError) -> AnalyzerError {
    if error.kind == "no_face" {
        AnalyzerError::NoFace
    } else {
        AnalyzerError::Backend(format!(
            "{}: {}",
            error.kind,
            error.message.unwrap_or_default()
        ))
    }
}

pub(crate) fn parse_detect_reply(body: &[u8]) -> Result<Vec<Detection>, AnalyzerError> {
    let reply: DetectReply = serde_json::from_slice(body)
        .map_err(|e| AnalyzerError::Backend(format!("malformed detection reply: {e}")))?;
    match reply.error {
        Some(error) => Err(reply_error(error)),
        None => Ok(reply.faces),
    }
}

pub(crate) fn parse_represent_reply(body: &[u8]) -> Result<FeatureVector, AnalyzerError> {
    let reply: RepresentReply = serde_json::from_slice(body)
        .map_err(|e| AnalyzerError::Backend(format!("malformed embedding reply: {e}")))?;
    if let Some(error) = reply.error {
        return Err(reply_error(error));
    }
    match reply.embedding {
        Some(values) if !values.is_empty() => Ok(FeatureVector::new(values)),
        _ => Err(AnalyzerError::NoFace),
    }
}
