//! Data types shared by the transfer manager and the coordinator.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chunkdrop_transfer::{Part, SourceFile};

/// Upload state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadState {
    #[default]
    Init,
    Hashing,
    Verifying,
    Transferring,
    Paused,
    Merging,
    Done,
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Hashing => "hashing",
            Self::Verifying => "verifying",
            Self::Transferring => "transferring",
            Self::Paused => "paused",
            Self::Merging => "merging",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Event emitted while an upload runs.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    StateChanged(UploadState),
    /// Hash progress, 0 to 100.
    HashProgress(f64),
    /// Bytes of one part sent or stored so far.
    PartProgress {
        index: usize,
        loaded: u64,
        percent: f64,
    },
    /// Aggregate percent over all parts, the current send rate and the
    /// estimated time left (unknown until the rate is).
    Progress {
        percent: f64,
        bytes_per_second: f64,
        eta: Option<Duration>,
    },
    /// The artifact is stored. `instant` is set when nothing had to be sent.
    Completed {
        fingerprint_name: String,
        instant: bool,
    },
    Failed { error: String },
}

/// How a call to upload or resume ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The artifact is stored on the server.
    Done {
        fingerprint_name: String,
        instant: bool,
    },
    /// The transfer was paused; call resume to continue.
    Paused,
}

/// Client-visible state of the current upload.
#[derive(Debug, Clone, Default)]
pub struct UploadStatus {
    pub state: UploadState,
    pub file: Option<SourceFile>,
    pub fingerprint_name: Option<String>,
    /// Every part of the file, indexed by part index.
    pub parts: Vec<Part>,
    /// Bumped on every new upload so a delayed reset skips newer uploads.
    pub generation: u64,
}

/// Shared handle to [`UploadStatus`].
///
/// The lock is never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct SharedStatus(Arc<RwLock<UploadStatus>>);

impl SharedStatus {
    pub fn read(&self) -> RwLockReadGuard<'_, UploadStatus> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, UploadStatus> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}
