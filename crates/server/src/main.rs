//! chunkdrop server binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chunkdrop_server::{AppState, ServerConfig};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Resumable chunked upload server.
#[derive(Parser, Debug)]
#[command(name = "chunkdrop-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long, env = "CHUNKDROP_CONFIG", default_value = "chunkdrop.json")]
    config: PathBuf,

    /// Listen port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Listen host
    #[arg(long, env = "CHUNKDROP_HOST")]
    host: Option<String>,

    /// Root directory for `public/` and `temp/`
    #[arg(short, long, env = "CHUNKDROP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Merge stride used when a merge request carries no `size`
    #[arg(long)]
    merge_stride: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chunkdrop=debug,tower_http=info")),
        )
        .init();

    tracing::info!("chunkdrop-server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ServerConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(stride) = args.merge_stride {
        config.merge_stride = stride;
    }
    config.validate()?;

    let addr = config.listen_addr()?;
    let state = AppState::from_config(config)
        .await
        .context("failed to prepare storage directories")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    chunkdrop_server::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
    })
    .await?;

    Ok(())
}
