//! Client-role view of the compute role, spoken over multipart HTTP.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{BlindCompute, ScoreSheet};
use crate::auth::INTERNAL_TOKEN_HEADER;
use crate::crypto::EncryptedVector;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{StoreAck, TemplateStore};

const STORE_PATH: &str = "/fhe/store-encrypted-embedding/";
const VERIFY_PATH: &str = "/fhe/verify-with-embedding/";
const SELF_SIMILARITY_PATH: &str = "/fhe/test-similarity/";

#[derive(Clone)]
pub struct RemoteComputeClient {
    client: Client,
    base_url: String,
    internal_token: Option<String>,
}

#[derive(Deserialize)]
struct SelfSimilarityResponse {
    result: String,
}

/// Error body of a failed upstream call, when it has one.
#[derive(Deserialize)]
struct UpstreamError {
    error: String,
}

impl RemoteComputeClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        internal_token: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            internal_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn ciphertext_part(ciphertext: &EncryptedVector) -> ServiceResult<Part> {
        Ok(Part::bytes(ciphertext.to_bytes()?)
            .file_name("embedding.bin")
            .mime_str("application/octet-stream")?)
    }

    async fn post_form<T: DeserializeOwned>(&self, path: &str, form: Form) -> ServiceResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).multipart(form);
        if let Some(token) = self.internal_token.as_deref() {
            request = request.header(INTERNAL_TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<UpstreamError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ServiceError::UpstreamFailure(format!(
                "{path} returned {status}: {detail}"
            )));
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::from(e)
            } else {
                ServiceError::UpstreamFailure(format!("{path} returned an unexpected body: {e}"))
            }
        })
    }
}

impl BlindCompute for RemoteComputeClient {
    fn score<'a>(
        &'a self,
        session_id: Option<&'a str>,
        probe: &'a EncryptedVector,
    ) -> BoxFuture<'a, ServiceResult<ScoreSheet>> {
        Box::pin(async move {
            let mut form = Form::new().part("file", Self::ciphertext_part(probe)?);
            if let Some(session_id) = session_id {
                form = form.text("session_id", session_id.to_string());
            }
            self.post_form(VERIFY_PATH, form).await
        })
    }

    fn self_similarity<'a>(
        &'a self,
        probe: &'a EncryptedVector,
    ) -> BoxFuture<'a, ServiceResult<EncryptedVector>> {
        Box::pin(async move {
            let form = Form::new().part("file", Self::ciphertext_part(probe)?);
            let response: SelfSimilarityResponse =
                self.post_form(SELF_SIMILARITY_PATH, form).await?;
            EncryptedVector::from_base64(&response.result)
        })
    }
}

impl TemplateStore for RemoteComputeClient {
    fn put<'a>(
        &'a self,
        user_id: &'a str,
        full_name: Option<&'a str>,
        template: &'a EncryptedVector,
    ) -> BoxFuture<'a, ServiceResult<StoreAck>> {
        Box::pin(async move {
            let mut form = Form::new().text("user_id", user_id.to_string());
            if let Some(full_name) = full_name {
                form = form.text("full_name", full_name.to_string());
            }
            let form = form.part("file", Self::ciphertext_part(template)?);
            self.post_form(STORE_PATH, form).await
        })
    }
}
