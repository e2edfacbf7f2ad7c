use axum::body::Bytes;
use tracing::info;

use super::FaceProtocol;
use crate::capture::Purpose;
use crate::error::{ServiceError, ServiceResult};
use crate::store::StoreAck;

impl FaceProtocol {
    /// Register `user_id` from a face image. The store's acknowledgment or
    /// error is returned as-is.
    #[tracing::instrument(skip(self, full_name, bytes), fields(image_bytes = bytes.len()))]
    pub async fn enroll(
        &self,
        user_id: &str,
        full_name: Option<&str>,
        bytes: Bytes,
    ) -> ServiceResult<StoreAck> {
        if user_id.trim().is_empty() {
            return Err(ServiceError::InvalidInput("user_id is required".to_string()));
        }

        let template = self.capture_and_encrypt(bytes, Purpose::Enrollment).await?;
        let ack = self.store.put(user_id, full_name, &template).await?;
        info!(user_id, "Face registered");
        Ok(ack)
    }
}
