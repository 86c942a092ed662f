use std::io::SeekFrom;

use bytes::Bytes;
use chunkdrop_protocol::{validate_component, validate_part_name};
use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use super::Storage;
use crate::error::StorageError;

/// Result of receiving a part body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Bytes were written; `len` is the part file length afterwards.
    Stored { written: u64, len: u64 },
    /// The artifact already exists; the body was discarded.
    AlreadyMerged,
}

impl Storage {
    /// Writes `body` into part `part_name` starting at byte `start`.
    ///
    /// The staging area is created if missing (safe under concurrent
    /// creation). The part file is opened without truncation and written
    /// from `start`, so re-sending a range at the same offset leaves the file
    /// unchanged. `start` may not exceed the current file length.
    ///
    /// Whatever arrived before a body error or disconnect is flushed and kept
    /// on disk so a later verification reports it. Success is returned only
    /// after the file has been synced and closed.
    pub async fn receive_part<S>(
        &self,
        fingerprint_name: &str,
        start: u64,
        part_name: &str,
        mut body: S,
    ) -> Result<ReceiveOutcome, StorageError>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Unpin,
    {
        validate_component(fingerprint_name)?;
        let index = validate_part_name(fingerprint_name, part_name)?;

        if self.artifact_exists(fingerprint_name).await? {
            while let Some(chunk) = body.next().await {
                if chunk.is_err() {
                    break;
                }
            }
            debug!(name = %fingerprint_name, index, "part for merged artifact discarded");
            return Ok(ReceiveOutcome::AlreadyMerged);
        }

        let staging = self.staging_dir(fingerprint_name);
        let path = staging.join(part_name);

        // Checked before anything is created so a rejected request leaves
        // no empty part behind.
        let existing = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        if start > existing {
            return Err(StorageError::OffsetBeyondEnd {
                offset: start,
                len: existing,
            });
        }

        tokio::fs::create_dir_all(&staging).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await?;

        file.seek(SeekFrom::Start(start)).await?;

        let mut written = 0u64;
        let interrupted = loop {
            match body.next().await {
                Some(Ok(chunk)) => {
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                Some(Err(e)) => break Some(e),
                None => break None,
            }
        };

        file.flush().await?;
        file.sync_data().await?;
        let len = file.metadata().await?.len();
        drop(file);

        if let Some(source) = interrupted {
            warn!(
                part = %part_name,
                start,
                written,
                error = %source,
                "part body interrupted, received bytes kept"
            );
            return Err(StorageError::BodyInterrupted { written, source });
        }

        debug!(part = %part_name, start, written, len, "part stored");
        Ok(ReceiveOutcome::Stored { written, len })
    }
}
