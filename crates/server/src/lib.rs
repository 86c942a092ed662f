//! HTTP server side of the chunkdrop upload protocol.
//!
//! Answers verification queries from the staging directory, streams part
//! bodies to offset-addressed part files and merges completed staging areas
//! into content-addressed artifacts.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod storage;

pub use config::ServerConfig;
pub use error::{ApiError, ConfigError, StorageError};
pub use routes::create_router;
pub use state::AppState;
pub use storage::{MergeOutcome, ReceiveOutcome, StagedPart, Storage};

use std::future::Future;

/// Serves the protocol on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, public = %state.storage.public_dir().display(), "listening");
    }
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
