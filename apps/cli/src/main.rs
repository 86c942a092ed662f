//! chunkdrop command-line uploader.
//!
//! `chunkdrop upload FILE` sends a file in resumable parts. Ctrl-C pauses the
//! transfer; running the same command again resumes from what the server
//! already holds.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chunkdrop_client::{
    ClientConfig, HttpUploadApi, UploadCoordinator, UploadError, UploadEvent, UploadOutcome,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Log filter when `RUST_LOG` is unset. Kept quiet so log lines do not
/// break the progress line on stderr.
const LOG_FILTER_FALLBACK: &str = "warn,chunkdrop=info";

#[derive(Parser, Debug)]
#[command(name = "chunkdrop")]
#[command(version, about = "Resumable chunked uploads", long_about = None)]
struct Cli {
    /// Server base URL
    #[arg(long, env = "CHUNKDROP_URL", global = true)]
    url: Option<String>,

    /// JSON client configuration file
    #[arg(long, env = "CHUNKDROP_CLIENT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a file in resumable parts
    Upload {
        file: PathBuf,

        /// Part size in bytes
        #[arg(long)]
        part_size: Option<u64>,

        /// Accept any file type
        #[arg(long)]
        any_type: bool,
    },
    /// Upload a small file in a single form request
    Whole {
        file: PathBuf,

        /// Name to store the file under (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => ClientConfig::default(),
    };
    if let Some(url) = &cli.url {
        config.base_url = url.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(LOG_FILTER_FALLBACK)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(&cli)?;
    match cli.command {
        Commands::Upload {
            file,
            part_size,
            any_type,
        } => {
            if let Some(size) = part_size {
                config.part_size = size;
            }
            if any_type {
                config.accept.clear();
            }
            upload(config, &file).await
        }
        Commands::Whole { file, name } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("file has no name")?,
            };
            let api = Arc::new(HttpUploadApi::new(&config.base_url)?);
            UploadCoordinator::new(config, api)
                .upload_whole(&file, &name)
                .await?;
            println!("stored as {name}");
            Ok(())
        }
    }
}

async fn upload(config: ClientConfig, file: &Path) -> Result<()> {
    let api = Arc::new(HttpUploadApi::new(&config.base_url)?);
    let mut coordinator = UploadCoordinator::new(config, api);
    let mut events = coordinator
        .take_events()
        .context("event receiver already taken")?;
    let coordinator = Arc::new(coordinator);

    let printer = tokio::spawn(async move {
        let mut stderr = std::io::stderr();
        while let Some(event) = events.recv().await {
            match event {
                UploadEvent::StateChanged(state) => {
                    let _ = writeln!(stderr, "\r{state}");
                }
                UploadEvent::HashProgress(percent) => {
                    let _ = write!(stderr, "\rhashing {percent:5.1}%");
                }
                UploadEvent::Progress {
                    percent,
                    bytes_per_second,
                    eta,
                } => {
                    let eta = eta.map(|d| format!("{}s left", d.as_secs())).unwrap_or_default();
                    let _ = write!(
                        stderr,
                        "\rsending {percent:5.1}%  {:8.1} KiB/s  {eta:<12}",
                        bytes_per_second / 1024.0
                    );
                }
                UploadEvent::Failed { error } => {
                    let _ = writeln!(stderr, "\rerror: {error}");
                }
                UploadEvent::PartProgress { .. } | UploadEvent::Completed { .. } => {}
            }
            let _ = stderr.flush();
        }
    });

    let pauser = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() && !coordinator.pause() {
                coordinator.cancel_token().cancel();
            }
        })
    };

    let result = coordinator.upload(file).await;
    pauser.abort();
    let _ = pauser.await;
    drop(coordinator);
    let _ = printer.await;

    match result.map_err(halted)? {
        UploadOutcome::Done {
            fingerprint_name,
            instant,
        } => {
            if instant {
                println!("already stored as {fingerprint_name}");
            } else {
                println!("stored as {fingerprint_name}");
            }
            Ok(())
        }
        UploadOutcome::Paused => {
            bail!("upload paused; run the same command again to resume")
        }
    }
}

/// Adds the resume hint to failures a re-run can repair.
fn halted(e: UploadError) -> anyhow::Error {
    if e.is_resumable() {
        anyhow!("{e}; run the same command again to resume")
    } else {
        e.into()
    }
}
