//! Chunking, content hashing and part streaming for resumable uploads.
//!
//! A file is split into fixed-size [`PartRange`]s by [`chunk`], identified by
//! a [`ContentFingerprint`] computed over its raw bytes, and each part's unsent
//! suffix is streamed with [`open_part_stream`].

mod chunker;
mod hasher;
mod progress;
mod reader;
mod types;

pub use chunker::chunk;
pub use hasher::{ContentFingerprint, ContentHasher, checksum_bytes};
pub use progress::{SpeedCalculator, aggregate_percent};
pub use reader::{PART_READ_BUFFER, PartStream, open_part_stream};
pub use types::{Part, PartRange, SourceFile};

/// Default part size: 100 MiB.
pub const DEFAULT_PART_SIZE: u64 = 100 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("part size must be greater than zero")]
    InvalidPartSize,

    #[error("offset {offset} is outside part of {size} bytes")]
    InvalidOffset { offset: u64, size: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("hash worker failed: {0}")]
    Worker(String),
}
