//! Client side of the chunkdrop resumable upload protocol.
//!
//! [`UploadCoordinator`] runs the flow: admit the file, split it into parts,
//! fingerprint its content, ask the server what it already holds, send the
//! missing byte ranges concurrently and request the merge. Uploads can be
//! paused and resumed; resuming re-queries the server and sends only what
//! is still missing.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod transfer;
pub mod types;

#[cfg(test)]
mod testing;

pub use api::{ApiFuture, HttpUploadApi, UploadApi};
pub use config::ClientConfig;
pub use coordinator::UploadCoordinator;
pub use error::UploadError;
pub use transfer::PartTransferManager;
pub use types::{UploadEvent, UploadOutcome, UploadState};
