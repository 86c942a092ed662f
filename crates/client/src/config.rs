//! Client configuration and file admission rules.

use std::time::Duration;

use chunkdrop_transfer::{DEFAULT_PART_SIZE, SourceFile};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Default server base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default size cap: 2 GiB.
pub const DEFAULT_MAX_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Extensions accepted by default.
pub const DEFAULT_ACCEPT: &[&str] = &["jpg", "jpeg", "png", "gif", "mp4"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Part size in bytes; also sent to the server as the merge stride.
    pub part_size: u64,
    /// Accepted extensions without the dot, case-insensitive. Empty accepts anything.
    pub accept: Vec<String>,
    pub max_size: u64,
    /// Delay before client state is cleared after a completed upload.
    pub reset_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            part_size: DEFAULT_PART_SIZE,
            accept: DEFAULT_ACCEPT.iter().map(|s| s.to_string()).collect(),
            max_size: DEFAULT_MAX_SIZE,
            reset_delay_ms: 1000,
        }
    }
}

impl ClientConfig {
    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    /// Checks `file` against the type filter, the size cap and emptiness.
    pub fn admit(&self, file: &SourceFile) -> Result<(), UploadError> {
        if !self.accept.is_empty() {
            let ext = file.extension_lowercase();
            if !self.accept.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
                return Err(UploadError::InvalidFile(format!(
                    "{}: type not accepted (allowed: {})",
                    file.name,
                    self.accept.join(", ")
                )));
            }
        }
        if file.size == 0 {
            return Err(UploadError::InvalidFile(format!("{} is empty", file.name)));
        }
        if file.size > self.max_size {
            return Err(UploadError::InvalidFile(format!(
                "{}: {} bytes exceeds the {} byte limit",
                file.name, file.size, self.max_size
            )));
        }
        Ok(())
    }
}
