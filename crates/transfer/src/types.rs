use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::TransferError;

/// A file selected for upload. Immutable once opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Local path of the file.
    pub path: PathBuf,
    /// File name including extension.
    pub name: String,
    /// Extension with its leading dot, or empty.
    pub extension: String,
    /// Size in bytes.
    pub size: u64,
}

impl SourceFile {
    /// Reads the metadata of `path`.
    pub async fn open(path: &Path) -> Result<Self, TransferError> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            name,
            extension,
            size: metadata.len(),
        })
    }

    /// Extension without the leading dot, lowercased.
    pub fn extension_lowercase(&self) -> String {
        self.extension.trim_start_matches('.').to_ascii_lowercase()
    }
}

/// One contiguous byte range of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartRange {
    /// Sequence index, starting at 0.
    pub index: usize,
    /// Byte offset of the first byte within the file.
    pub start: u64,
    /// Length in bytes.
    pub size: u64,
}

impl PartRange {
    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.start + self.size
    }
}

/// A part being transferred: its range plus transfer progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Part {
    pub range: PartRange,
    /// Staging name on the server, `{fingerprintName}-{index}`.
    pub name: String,
    /// Bytes of this part already sent or stored.
    pub loaded: u64,
    /// `loaded` as a percentage of the part size.
    pub percent: f64,
}

impl Part {
    /// Creates a part with no progress.
    pub fn new(range: PartRange, name: String) -> Self {
        Self {
            range,
            name,
            loaded: 0,
            percent: 0.0,
        }
    }

    /// Creates the part covering `range` of the file named `fingerprint_name`.
    pub fn from_range(range: PartRange, fingerprint_name: &str) -> Self {
        Self::new(range, chunkdrop_protocol::part_name(fingerprint_name, range.index))
    }

    pub fn index(&self) -> usize {
        self.range.index
    }

    pub fn size(&self) -> u64 {
        self.range.size
    }

    /// Sets `loaded` (clamped to the part size) and recomputes `percent`.
    pub fn set_loaded(&mut self, loaded: u64) {
        self.loaded = loaded.min(self.range.size);
        self.percent = if self.range.size == 0 {
            100.0
        } else {
            self.loaded as f64 / self.range.size as f64 * 100.0
        };
    }

    /// Returns `true` once every byte is accounted for.
    pub fn is_complete(&self) -> bool {
        self.loaded >= self.range.size
    }

    /// Bytes not yet sent.
    pub fn remaining(&self) -> u64 {
        self.range.size - self.loaded
    }
}
