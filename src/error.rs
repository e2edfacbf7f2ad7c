//! Error types for the face verification service.
//!
//! Every failure is distinguishable by kind: capture rejections are the
//! caller's to fix (re-capture), context faults are deployment problems,
//! upstream faults belong to a collaborator.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::analysis::AnalyzerError;
use crate::capture::{Purpose, Rejection};
use crate::ckks::CkksError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{}", rejection.message(*purpose))]
    CaptureRejected {
        purpose: Purpose,
        rejection: Rejection,
    },

    #[error("Crypto context unavailable: {0}")]
    ContextUnavailable(String),

    #[error("Ciphertext does not belong to the loaded context: {0}")]
    IncompatibleContext(String),

    #[error("Operation requires the secret context")]
    NotASecretContext,

    #[error("Embedding has {actual} values, context expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("Upstream timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Template store error: {0}")]
    Store(String),

    #[error("No template stored for user: {0}")]
    TemplateNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("CKKS error: {0}")]
    Ckks(CkksError),

    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server busy: {0}")]
    Busy(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl ServiceError {
    pub fn capture(purpose: Purpose, rejection: Rejection) -> Self {
        Self::CaptureRejected { purpose, rejection }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CaptureRejected { rejection, .. } => rejection.code(),
            Self::ContextUnavailable(_) => "CONTEXT_UNAVAILABLE",
            Self::IncompatibleContext(_) => "INCOMPATIBLE_CONTEXT",
            Self::NotASecretContext => "NOT_A_SECRET_CONTEXT",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::UpstreamFailure(_) => "UPSTREAM_FAILURE",
            Self::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            Self::Store(_) => "STORE_ERROR",
            Self::TemplateNotFound(_) => "TEMPLATE_NOT_FOUND",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::MalformedCiphertext(_) => "MALFORMED_CIPHERTEXT",
            Self::Ckks(_) => "CRYPTO_ERROR",
            Self::Bincode(_) => "SERIALIZATION_ERROR",
            Self::Base64(_) => "INVALID_BASE64",
            Self::Io(_) => "IO_ERROR",
            Self::Busy(_) => "SERVER_BUSY",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request - the caller can fix these
            Self::CaptureRejected { .. }
            | Self::InvalidInput(_)
            | Self::MalformedCiphertext(_)
            | Self::Base64(_) => StatusCode::BAD_REQUEST,

            // Compute-role lookup by user id
            Self::TemplateNotFound(_) => StatusCode::NOT_FOUND,

            Self::Busy(_) | Self::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 - collaborator, deployment and contract faults; `code` tells them apart
            Self::UpstreamFailure(_)
            | Self::UpstreamTimeout(_)
            | Self::ContextUnavailable(_)
            | Self::IncompatibleContext(_)
            | Self::NotASecretContext
            | Self::DimensionMismatch { .. }
            | Self::Store(_)
            | Self::Ckks(_)
            | Self::Bincode(_)
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_capture_rejection(&self) -> bool {
        matches!(self, Self::CaptureRejected { .. })
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "{self}");
        }

        let reason = match &self {
            Self::CaptureRejected { rejection, .. } => rejection.reason().map(str::to_string),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.error_code(),
            reason,
        };

        (status, Json(body)).into_response()
    }
}

impl From<CkksError> for ServiceError {
    fn from(err: CkksError) -> Self {
        match err {
            CkksError::ParameterMismatch(detail) => Self::IncompatibleContext(detail),
            CkksError::MissingSecretKey => Self::NotASecretContext,
            other => Self::Ckks(other),
        }
    }
}

impl From<AnalyzerError> for ServiceError {
    fn from(err: AnalyzerError) -> Self {
        match err {
            AnalyzerError::Timeout(detail) => Self::UpstreamTimeout(detail),
            other => Self::UpstreamFailure(other.to_string()),
        }
    }
}

impl From<redb::Error> for ServiceError {
    fn from(err: redb::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<redb::DatabaseError> for ServiceError {
    fn from(err: redb::DatabaseError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<redb::TableError> for ServiceError {
    fn from(err: redb::TableError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<redb::TransactionError> for ServiceError {
    fn from(err: redb::TransactionError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<redb::CommitError> for ServiceError {
    fn from(err: redb::CommitError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<redb::StorageError> for ServiceError {
    fn from(err: redb::StorageError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::UpstreamTimeout(format!("Request timed out: {err}"))
        } else if err.is_connect() {
            Self::UpstreamFailure(format!("Connection failed: {err}"))
        } else {
            Self::UpstreamFailure(err.to_string())
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ServiceError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self::InvalidInput(format!("malformed multipart body: {}", err.body_text()))
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("worker task failed: {err}"))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
