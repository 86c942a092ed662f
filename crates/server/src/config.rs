//! Server configuration.
//!
//! Read from an optional JSON file; command-line flags and environment
//! variables are applied on top by the binary.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default listen port, matching the client's default base URL.
pub const DEFAULT_PORT: u16 = 8000;

/// Default merge stride when the merge request does not carry one: 10 MiB.
pub const DEFAULT_MERGE_STRIDE: u64 = 10 * 1024 * 1024;

/// Default body limit for the whole-file form upload: 2 GiB.
pub const DEFAULT_WHOLE_UPLOAD_LIMIT: u64 = 2 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root holding `public/` and `temp/` unless those are set explicitly.
    pub data_dir: PathBuf,
    pub public_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub merge_stride: u64,
    pub whole_upload_limit: u64,
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from("data"),
            public_dir: None,
            temp_dir: None,
            merge_stride: DEFAULT_MERGE_STRIDE,
            whole_upload_limit: DEFAULT_WHOLE_UPLOAD_LIMIT,
            cors: true,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that would make the server unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.merge_stride == 0 {
            return Err(ConfigError::Invalid("mergeStride must be > 0".into()));
        }
        Ok(())
    }

    /// Directory of finished artifacts.
    pub fn public_dir(&self) -> PathBuf {
        self.public_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("public"))
    }

    /// Directory of staging areas.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("temp"))
    }

    /// Socket address to bind.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("listen address: {e}")))
    }
}
