use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::TransferError;
use crate::types::PartRange;

/// Read buffer used while hashing: 1 MiB.
const HASH_BUFFER_SIZE: usize = 1024 * 1024;

/// Hex-encoded SHA-256 of a file's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    /// Wraps an already computed hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Artifact name for this fingerprint: digest followed by `extension`.
    pub fn artifact_name(&self, extension: &str) -> String {
        chunkdrop_protocol::artifact_name(&self.0, extension)
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes content fingerprints on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct ContentHasher {
    buffer_size: usize,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            buffer_size: HASH_BUFFER_SIZE,
        }
    }

    /// Hashes the bytes of `path` covered by `ranges`, in order.
    ///
    /// After each range a percentage is offered on `progress_tx`; values are
    /// non-decreasing and the last one is 100. The digest only depends on the
    /// bytes read, never on where the ranges split them.
    pub async fn hash(
        &self,
        path: &Path,
        ranges: &[PartRange],
        progress_tx: mpsc::Sender<f64>,
        cancel: CancellationToken,
    ) -> Result<ContentFingerprint, TransferError> {
        let job = HashJob {
            path: path.to_path_buf(),
            ranges: ranges.to_vec(),
            buffer_size: self.buffer_size,
        };
        tokio::task::spawn_blocking(move || job.run(&progress_tx, &cancel))
            .await
            .map_err(|e| TransferError::Worker(e.to_string()))?
    }
}

struct HashJob {
    path: PathBuf,
    ranges: Vec<PartRange>,
    buffer_size: usize,
}

impl HashJob {
    fn run(
        self,
        progress_tx: &mpsc::Sender<f64>,
        cancel: &CancellationToken,
    ) -> Result<ContentFingerprint, TransferError> {
        let mut file = std::fs::File::open(&self.path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; self.buffer_size];
        let total = self.ranges.len();

        for (done, range) in self.ranges.iter().enumerate() {
            file.seek(SeekFrom::Start(range.start))?;
            let mut remaining = range.size;
            while remaining > 0 {
                if cancel.is_cancelled() {
                    return Err(TransferError::Cancelled);
                }
                let to_read = remaining.min(buf.len() as u64) as usize;
                file.read_exact(&mut buf[..to_read])?;
                hasher.update(&buf[..to_read]);
                remaining -= to_read as u64;
            }
            let _ = progress_tx.try_send((done + 1) as f64 / total as f64 * 100.0);
        }

        if total == 0 {
            let _ = progress_tx.try_send(100.0);
        }

        let digest = hex::encode(hasher.finalize());
        debug!(path = %self.path.display(), parts = total, %digest, "content hashed");
        Ok(ContentFingerprint(digest))
    }
}
