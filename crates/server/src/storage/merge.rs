use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use chunkdrop_protocol::validate_component;
use futures_util::future::try_join_all;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{info, warn};

use super::{StagedPart, Storage};
use crate::error::StorageError;

/// Result of a merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Parts were assembled into an artifact of `size` bytes.
    Merged { parts: usize, size: u64 },
    /// The artifact already existed; leftover staging was removed.
    AlreadyMerged,
}

impl Storage {
    /// Assembles the staged parts of `fingerprint_name` into its artifact.
    ///
    /// Parts are ordered by numeric index and must be exactly `0..n`; every
    /// part but the last must hold `stride` bytes and part `i` lands at
    /// `i * stride`. Parts are copied concurrently into a temporary file that
    /// is synced and renamed onto the artifact path only when every copy has
    /// succeeded. Staging is removed after the rename; on any failure the
    /// staging area is left untouched and no artifact appears.
    pub async fn merge(
        &self,
        fingerprint_name: &str,
        stride: u64,
    ) -> Result<MergeOutcome, StorageError> {
        validate_component(fingerprint_name)?;
        if stride == 0 {
            return Err(StorageError::InvalidStride);
        }

        if self.artifact_exists(fingerprint_name).await? {
            self.remove_staging(fingerprint_name).await;
            return Ok(MergeOutcome::AlreadyMerged);
        }

        let parts = self.staged_parts(fingerprint_name).await?;
        check_complete(fingerprint_name, &parts, stride)?;

        let size = self.write_artifact(fingerprint_name, &parts, stride).await?;

        for part in &parts {
            if let Err(e) = tokio::fs::remove_file(&part.path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(part = %part.name, error = %e, "failed to delete merged part");
            }
        }
        self.remove_staging(fingerprint_name).await;

        info!(
            name = %fingerprint_name,
            parts = parts.len(),
            bytes = size,
            "artifact merged"
        );
        Ok(MergeOutcome::Merged {
            parts: parts.len(),
            size,
        })
    }

    /// Copies `parts` into a temporary file and renames it onto the artifact.
    ///
    /// Either the complete artifact appears or nothing does: on failure the
    /// temporary file is removed and the staged parts are not touched.
    async fn write_artifact(
        &self,
        fingerprint_name: &str,
        parts: &[StagedPart],
        stride: u64,
    ) -> Result<u64, StorageError> {
        let size = parts.iter().map(|p| p.size).sum::<u64>();
        let tmp_path = self
            .temp_dir()
            .join(format!(".{fingerprint_name}.{}.merging", uuid::Uuid::new_v4()));

        let result = match assemble(&tmp_path, parts, stride, size).await {
            Ok(()) => tokio::fs::rename(&tmp_path, self.artifact_path(fingerprint_name)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            if let Err(rm) = tokio::fs::remove_file(&tmp_path).await
                && rm.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %tmp_path.display(), error = %rm, "failed to remove merge file");
            }
            warn!(name = %fingerprint_name, error = %e, "merge failed, staging kept");
            return Err(e.into());
        }
        Ok(size)
    }

    async fn remove_staging(&self, fingerprint_name: &str) {
        match tokio::fs::remove_dir_all(self.staging_dir(fingerprint_name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(name = %fingerprint_name, error = %e, "failed to remove staging area"),
        }
    }
}

/// Verifies that `parts` is a complete, gap-free sequence for `stride`.
fn check_complete(name: &str, parts: &[StagedPart], stride: u64) -> Result<(), StorageError> {
    let Some(last) = parts.last() else {
        return Err(StorageError::NothingToMerge(name.to_string()));
    };

    for (expected, part) in parts.iter().enumerate() {
        if part.index != expected {
            return Err(StorageError::MissingPart {
                name: name.to_string(),
                index: expected,
            });
        }
    }

    for part in &parts[..parts.len() - 1] {
        if part.size != stride {
            return Err(StorageError::IncompletePart {
                part: part.name.clone(),
                size: part.size,
                expected: stride,
            });
        }
    }
    if last.size == 0 || last.size > stride {
        return Err(StorageError::IncompletePart {
            part: last.name.clone(),
            size: last.size,
            expected: stride,
        });
    }
    Ok(())
}

/// Copies every part into `tmp_path` at `index * stride`, then syncs it.
async fn assemble(
    tmp_path: &Path,
    parts: &[StagedPart],
    stride: u64,
    size: u64,
) -> std::io::Result<()> {
    let file = tokio::fs::File::create(tmp_path).await?;
    file.set_len(size).await?;

    let copies = parts.iter().map(|part| {
        let dest = tmp_path.to_path_buf();
        let src = part.path.clone();
        let offset = part.index as u64 * stride;
        copy_at(src, dest, offset, part.size)
    });
    try_join_all(copies).await?;

    file.sync_all().await?;
    Ok(())
}

async fn copy_at(src: PathBuf, dest: PathBuf, offset: u64, expected: u64) -> std::io::Result<()> {
    let mut reader = tokio::fs::File::open(&src).await?;
    let mut writer = tokio::fs::OpenOptions::new().write(true).open(&dest).await?;
    writer.seek(SeekFrom::Start(offset)).await?;

    let copied = tokio::io::copy(&mut reader, &mut writer).await?;
    writer.flush().await?;
    if copied != expected {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("{} changed during merge: {copied} of {expected} bytes", src.display()),
        ));
    }
    Ok(())
}
