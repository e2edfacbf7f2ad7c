//! Multipart form reading shared by both roles.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::Multipart;

use crate::error::{ServiceError, ServiceResult};

const FILE_FIELD: &str = "file";

/// A fully buffered multipart upload: text fields plus the `file` part.
#[derive(Debug, Default)]
pub struct FormUpload {
    fields: HashMap<String, String>,
    file: Option<Bytes>,
}

impl FormUpload {
    pub async fn read(multipart: Result<Multipart, MultipartRejection>) -> ServiceResult<Self> {
        let mut multipart =
            multipart.map_err(|rejection| ServiceError::InvalidInput(rejection.body_text()))?;

        let mut upload = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == FILE_FIELD {
                upload.file = Some(field.bytes().await?);
            } else {
                let value = field.text().await?;
                upload.fields.insert(name, value);
            }
        }
        Ok(upload)
    }

    /// Trimmed text field; blank counts as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn require_text(&self, name: &str) -> ServiceResult<&str> {
        self.text(name)
            .ok_or_else(|| ServiceError::InvalidInput(format!("{name} is required")))
    }

    /// The uploaded file. Missing and empty uploads are both invalid.
    pub fn take_file(&mut self) -> ServiceResult<Bytes> {
        match self.file.take() {
            Some(bytes) if !bytes.is_empty() => Ok(bytes),
            Some(_) => Err(ServiceError::InvalidInput("file is empty".to_string())),
            None => Err(ServiceError::InvalidInput("file is required".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_count_as_absent() {
        let mut upload = FormUpload::default();
        upload.fields.insert("session_id".into(), "  ".into());
        upload.fields.insert("user_id".into(), " alice ".into());

        assert_eq!(upload.text("session_id"), None);
        assert_eq!(upload.text("user_id"), Some("alice"));
        assert!(matches!(
            upload.require_text("full_name"),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn file_is_required_and_non_empty() {
        let mut upload = FormUpload::default();
        assert!(upload.take_file().is_err());

        upload.file = Some(Bytes::new());
        assert!(upload.take_file().is_err());

        upload.file = Some(Bytes::from_static(b"png"));
        assert_eq!(upload.take_file().unwrap(), Bytes::from_static(b"png"));
    }
}
