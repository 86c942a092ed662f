//! Client error types.

use chunkdrop_transfer::TransferError;

/// Errors produced while uploading.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("server rejected request (code {code}): {msg}")]
    Protocol { code: i32, msg: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("invalid file: {0}")]
    InvalidFile(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("transfer error: {0}")]
    Transfer(TransferError),

    #[error("transfer task failed: {0}")]
    Task(String),
}

impl From<TransferError> for UploadError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Io(e) => Self::Io(e),
            TransferError::Cancelled => Self::Cancelled,
            other => Self::Transfer(other),
        }
    }
}

impl UploadError {
    /// Returns `true` for part-level failures that a later resume can repair.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Status { .. } | Self::Protocol { .. } | Self::Cancelled
        )
    }
}
