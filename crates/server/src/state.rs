//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig, storage: Storage) -> Self {
        Self {
            storage: Arc::new(storage),
            config: Arc::new(config),
        }
    }

    /// Builds the state from `config`, creating the storage directories.
    pub async fn from_config(config: ServerConfig) -> Result<Self, crate::error::StorageError> {
        let storage = Storage::new(config.public_dir(), config.temp_dir()).await?;
        Ok(Self::new(config, storage))
    }
}
