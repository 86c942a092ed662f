//! Local-disk persistence of staging areas and artifacts.
//!
//! Layout:
//!
//! ```text
//! public/{fingerprintName}                          finished artifacts
//! temp/{fingerprintName}/{fingerprintName}-{index}  staged parts
//! ```
//!
//! The existence of `public/{fingerprintName}` is the only durability record.
//! No locks are taken: concurrent requests rely on offset-addressed writes,
//! idempotent directory creation and atomic rename.

mod merge;
mod receiver;

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chunkdrop_protocol::{UploadedPart, VerifyResponse, validate_component, validate_part_name};
use futures_util::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::StorageError;

pub use merge::MergeOutcome;
pub use receiver::ReceiveOutcome;

/// A part file found in a staging area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPart {
    pub index: usize,
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
}

/// Artifact and staging storage rooted at two directories.
#[derive(Debug, Clone)]
pub struct Storage {
    public_dir: PathBuf,
    temp_dir: PathBuf,
}

impl Storage {
    /// Creates the storage, making sure both root directories exist.
    pub async fn new(public_dir: PathBuf, temp_dir: PathBuf) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&public_dir).await?;
        tokio::fs::create_dir_all(&temp_dir).await?;
        Ok(Self {
            public_dir,
            temp_dir,
        })
    }

    pub fn public_dir(&self) -> &Path {
        &self.public_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Path of the finished artifact.
    pub fn artifact_path(&self, fingerprint_name: &str) -> PathBuf {
        self.public_dir.join(fingerprint_name)
    }

    /// Path of the staging area of a fingerprint.
    pub fn staging_dir(&self, fingerprint_name: &str) -> PathBuf {
        self.temp_dir.join(fingerprint_name)
    }

    /// Returns `true` if the artifact is already stored.
    pub async fn artifact_exists(&self, fingerprint_name: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.artifact_path(fingerprint_name)).await?)
    }

    /// Reports whether an upload is needed and which parts are staged.
    pub async fn verify(&self, fingerprint_name: &str) -> Result<VerifyResponse, StorageError> {
        validate_component(fingerprint_name)?;

        if self.artifact_exists(fingerprint_name).await? {
            debug!(name = %fingerprint_name, "artifact already stored");
            return Ok(VerifyResponse::already_uploaded());
        }

        let uploaded = self
            .staged_parts(fingerprint_name)
            .await?
            .into_iter()
            .map(|p| UploadedPart {
                file_name: p.name,
                size: p.size,
            })
            .collect();
        Ok(VerifyResponse::pending(uploaded))
    }

    /// Lists the staged parts of a fingerprint, sorted by numeric index.
    ///
    /// A missing staging area yields an empty list. Entries that are not
    /// part files of this fingerprint are ignored.
    pub async fn staged_parts(
        &self,
        fingerprint_name: &str,
    ) -> Result<Vec<StagedPart>, StorageError> {
        let dir = self.staging_dir(fingerprint_name);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut parts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(index) = validate_part_name(fingerprint_name, &name) else {
                continue;
            };
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            parts.push(StagedPart {
                index,
                name,
                size: metadata.len(),
                path: entry.path(),
            });
        }
        parts.sort_by_key(|p| p.index);
        Ok(parts)
    }

    /// Stores a whole file under `public/{name}` in one request.
    ///
    /// The body is written to a temporary file first and moved into place
    /// once complete, replacing any existing file of that name.
    pub async fn store_whole<S>(&self, name: &str, body: S) -> Result<u64, StorageError>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Unpin,
    {
        validate_component(name)?;
        let spooled = self.spool(body).await?;
        self.publish(spooled, name).await
    }

    /// Writes `body` to a fresh temporary file in the temp root.
    ///
    /// Used when the destination name is not known until the whole request
    /// has been read. Nothing is left behind if the body fails.
    pub async fn spool<S>(&self, mut body: S) -> Result<Spooled, StorageError>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Unpin,
    {
        let path = self
            .temp_dir
            .join(format!(".whole.{}", uuid::Uuid::new_v4()));
        let result = async {
            let mut file = tokio::fs::File::create(&path).await?;
            let mut written = 0u64;
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.sync_all().await?;
            Ok::<_, std::io::Error>(written)
        }
        .await;

        match result {
            Ok(len) => Ok(Spooled { path, len }),
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                Err(e.into())
            }
        }
    }

    /// Moves a spooled file to `public/{name}`.
    pub async fn publish(&self, spooled: Spooled, name: &str) -> Result<u64, StorageError> {
        if let Err(e) = validate_component(name) {
            spooled.discard().await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&spooled.path, self.public_dir.join(name)).await {
            spooled.discard().await;
            return Err(e.into());
        }
        info!(name, bytes = spooled.len, "whole file stored");
        Ok(spooled.len)
    }
}

/// A fully received request body waiting for its final name.
#[derive(Debug)]
pub struct Spooled {
    path: PathBuf,
    len: u64,
}

impl Spooled {
    pub fn size(&self) -> u64 {
        self.len
    }

    /// Removes the temporary file.
    pub async fn discard(self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove spooled upload");
        }
    }
}
