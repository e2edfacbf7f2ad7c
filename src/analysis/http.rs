//! Face analyzer reached over HTTP.
//!
//! `POST {base}/detect` with `{"img": <base64>, "anti_spoofing": bool}` and
//! `POST {base}/represent` with `{"img": <base64>}`. A `422` status carries a
//! typed error object in the usual reply shape.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures_util::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde_json::json;

use super::{
    parse_detect_reply, parse_represent_reply, AnalyzerError, DetectOptions, Detection,
    EmbeddingExtractor, FaceDetector,
};
use crate::capture::CaptureImage;
use crate::embedding::FeatureVector;

#[derive(Clone)]
pub struct HttpFaceAnalyzer {
    client: Client,
    base_url: String,
}

impl HttpFaceAnalyzer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn call(&self, path: &str, body: serde_json::Value) -> Result<Vec<u8>, AnalyzerError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(classify_transport_error)?;
        if status.is_success() || status == StatusCode::UNPROCESSABLE_ENTITY {
            return Ok(bytes.to_vec());
        }
        Err(AnalyzerError::Backend(format!(
            "{url} returned {status}: {}",
            String::from_utf8_lossy(&bytes)
        )))
    }
}

fn classify_transport_error(err: reqwest::Error) -> AnalyzerError {
    if err.is_timeout() {
        AnalyzerError::Timeout(err.to_string())
    } else if err.is_connect() {
        AnalyzerError::Backend(format!("Connection failed: {err}"))
    } else {
        AnalyzerError::Backend(err.to_string())
    }
}

impl FaceDetector for HttpFaceAnalyzer {
    fn detect<'a>(
        &'a self,
        image: &'a CaptureImage,
        options: DetectOptions,
    ) -> BoxFuture<'a, Result<Vec<Detection>, AnalyzerError>> {
        Box::pin(async move {
            let body = json!({
                "img": BASE64.encode(image.bytes()),
                "anti_spoofing": options.anti_spoofing,
            });
            let reply = self.call("/detect", body).await?;
            parse_detect_reply(&reply)
        })
    }
}

impl EmbeddingExtractor for HttpFaceAnalyzer {
    fn extract<'a>(
        &'a self,
        image: &'a CaptureImage,
    ) -> BoxFuture<'a, Result<FeatureVector, AnalyzerError>> {
        Box::pin(async move {
            let body = json!({ "img": BASE64.encode(image.bytes()) });
            let reply = self.call("/represent", body).await?;
            parse_represent_reply(&reply)
        })
    }
}
