//! Error types for storage, configuration and the HTTP API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chunkdrop_protocol::{ApiResponse, NamingError};

/// Errors loading the server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors produced by staging and merging on local disk.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid name: {0}")]
    Naming(#[from] NamingError),

    #[error("start offset {offset} is past the {len} bytes already stored")]
    OffsetBeyondEnd { offset: u64, len: u64 },

    #[error("request body interrupted after {written} bytes: {source}")]
    BodyInterrupted {
        written: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("nothing staged for {0}")]
    NothingToMerge(String),

    #[error("part {index} of {name} is missing")]
    MissingPart { name: String, index: usize },

    #[error("part {part} holds {size} bytes, expected {expected}")]
    IncompletePart {
        part: String,
        size: u64,
        expected: u64,
    },

    #[error("merge stride must be greater than zero")]
    InvalidStride,

    #[error("missing form field: {0}")]
    MissingField(&'static str),
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// HTTP status for this error.
    ///
    /// Merge preconditions are protocol outcomes: the transport succeeds and
    /// the envelope carries the failure code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Storage(e) => match e {
                StorageError::Naming(_)
                | StorageError::InvalidStride
                | StorageError::MissingField(_)
                | StorageError::BodyInterrupted { .. } => StatusCode::BAD_REQUEST,
                StorageError::OffsetBeyondEnd { .. } => StatusCode::CONFLICT,
                StorageError::NothingToMerge(_)
                | StorageError::MissingPart { .. }
                | StorageError::IncompletePart { .. } => StatusCode::OK,
                StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        (status, Json(ApiResponse::fail(self.to_string(), false))).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
