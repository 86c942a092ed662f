//! Upload coordinator: chunk, hash, verify, transfer and merge.
//!
//! ```text
//! Init -> Hashing -> Verifying -> Transferring -> Merging -> Done
//!                        |             |  ^
//!                        |             v  |
//!                        |           Paused
//!                        +-> Done (artifact already stored)
//! ```
//!
//! Resume always starts over from verification: the server's staging area
//! is the source of truth, client-side progress is only a display hint.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chunkdrop_transfer::{
    ContentHasher, Part, SourceFile, SpeedCalculator, aggregate_percent, chunk,
};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::UploadApi;
use crate::config::ClientConfig;
use crate::error::UploadError;
use crate::transfer::PartTransferManager;
use crate::types::{SharedStatus, UploadEvent, UploadOutcome, UploadState, UploadStatus};

/// Event channel capacity. Events are sent with `try_send`; a full channel
/// drops progress updates rather than stalling transfers.
pub const EVENT_BUFFER_SIZE: usize = 1024;

/// Drives one upload at a time through the state machine.
///
/// Methods take `&self`; share the coordinator in an `Arc` to pause from
/// another task while an upload runs.
pub struct UploadCoordinator {
    config: ClientConfig,
    api: Arc<dyn UploadApi>,
    hasher: ContentHasher,
    status: SharedStatus,
    speed: Arc<SpeedCalculator>,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    /// Cancels hashing and transfers for good.
    shutdown: CancellationToken,
    /// Cancels the in-flight transfers of the current run; replaced per run.
    transfer: Mutex<CancellationToken>,
    running: AtomicBool,
}

/// Clears the running flag when a flow ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl UploadCoordinator {
    pub fn new(config: ClientConfig, api: Arc<dyn UploadApi>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let shutdown = CancellationToken::new();
        Self {
            config,
            api,
            hasher: ContentHasher::new(),
            status: SharedStatus::default(),
            speed: Arc::new(SpeedCalculator::default()),
            events_tx,
            events_rx: Some(events_rx),
            transfer: Mutex::new(shutdown.child_token()),
            shutdown,
            running: AtomicBool::new(false),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Token that aborts hashing and transfers permanently when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> UploadState {
        self.status.read().state
    }

    /// Aggregate percent: the unweighted mean of per-part percentages.
    pub fn progress(&self) -> f64 {
        aggregate_percent(&self.status.read().parts)
    }

    pub fn parts(&self) -> Vec<Part> {
        self.status.read().parts.clone()
    }

    pub fn fingerprint_name(&self) -> Option<String> {
        self.status.read().fingerprint_name.clone()
    }

    /// Current send rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        self.speed.bytes_per_second()
    }

    /// Uploads the file at `path`.
    ///
    /// Returns [`UploadOutcome::Paused`] if [`pause`](Self::pause) was called
    /// during the transfer. Local failures (unreadable file, hashing) return
    /// the coordinator to `Init`; transfer and merge failures leave it in
    /// `Transferring` so that [`resume`](Self::resume) can continue.
    pub async fn upload(&self, path: &Path) -> Result<UploadOutcome, UploadError> {
        let state = self.state();
        if !matches!(state, UploadState::Init | UploadState::Done) {
            return Err(UploadError::InvalidState(format!(
                "cannot start an upload while {state}"
            )));
        }
        let _guard = self.enter()?;

        let prepared = self.prepare(path).await;
        let fingerprint_name = match prepared {
            Ok(name) => name,
            Err(e) => {
                error!(path = %path.display(), error = %e, "upload aborted");
                self.reset();
                self.emit(UploadEvent::Failed {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        self.set_state(UploadState::Verifying);
        self.run(&fingerprint_name).await
    }

    /// Continues a paused or failed upload from whatever the server holds.
    pub async fn resume(&self) -> Result<UploadOutcome, UploadError> {
        // Entering the run and leaving Paused/Transferring happen under one
        // lock so a concurrent pause cannot target the previous run.
        let (_guard, fingerprint_name) = {
            let mut status = self.status.write();
            let state = status.state;
            if !matches!(state, UploadState::Paused | UploadState::Transferring) {
                return Err(UploadError::InvalidState(format!(
                    "nothing to resume while {state}"
                )));
            }
            let Some(name) = status.fingerprint_name.clone() else {
                return Err(UploadError::InvalidState("no upload to resume".into()));
            };
            let guard = self.enter()?;
            status.state = UploadState::Verifying;
            (guard, name)
        };
        self.emit(UploadEvent::StateChanged(UploadState::Verifying));

        info!(name = %fingerprint_name, "resuming upload");
        self.run(&fingerprint_name).await
    }

    /// Sends a small file in one form request, stored as `public/{name}`.
    ///
    /// The file passes the same type and size checks as a chunked upload.
    pub async fn upload_whole(&self, path: &Path, name: &str) -> Result<(), UploadError> {
        let file = SourceFile::open(path).await?;
        self.config.admit(&file)?;
        self.api.whole_upload(&file.path, name).await?;
        info!(file = %file.name, name, bytes = file.size, "whole file uploaded");
        Ok(())
    }

    /// Cancels every in-flight part request.
    ///
    /// Parts keep the progress they reached. Returns `false` when no
    /// transfer is running.
    pub fn pause(&self) -> bool {
        {
            let mut status = self.status.write();
            if status.state != UploadState::Transferring || !self.running.load(Ordering::SeqCst) {
                return false;
            }
            status.state = UploadState::Paused;
        }
        self.current_transfer().cancel();
        self.emit(UploadEvent::StateChanged(UploadState::Paused));
        info!("upload paused");
        true
    }

    fn enter(&self) -> Result<RunGuard<'_>, UploadError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(UploadError::InvalidState("an upload is already running".into()));
        }
        Ok(RunGuard(&self.running))
    }

    /// Admits the file, chunks it and computes its fingerprint name.
    async fn prepare(&self, path: &Path) -> Result<String, UploadError> {
        let file = SourceFile::open(path).await?;
        self.config.admit(&file)?;
        let ranges = chunk(file.size, self.config.part_size)?;

        {
            let mut status = self.status.write();
            status.generation += 1;
            status.file = Some(file.clone());
            status.fingerprint_name = None;
            status.parts.clear();
        }
        self.set_state(UploadState::Hashing);
        info!(file = %file.name, bytes = file.size, parts = ranges.len(), "hashing");

        let (progress_tx, mut progress_rx) = mpsc::channel(ranges.len().max(1) + 1);
        let events_tx = self.events_tx.clone();
        let forward = tokio::spawn(async move {
            while let Some(percent) = progress_rx.recv().await {
                let _ = events_tx.try_send(UploadEvent::HashProgress(percent));
            }
        });

        let fingerprint = self
            .hasher
            .hash(&file.path, &ranges, progress_tx, self.shutdown.child_token())
            .await;
        let _ = forward.await;
        let fingerprint = fingerprint?;

        let name = fingerprint.artifact_name(&file.extension);
        debug!(name = %name, "fingerprint ready");
        {
            let mut status = self.status.write();
            status.fingerprint_name = Some(name.clone());
            status.parts = ranges
                .into_iter()
                .map(|r| Part::from_range(r, &name))
                .collect();
        }
        Ok(name)
    }

    /// Verify, transfer what is missing, merge.
    async fn run(&self, fingerprint_name: &str) -> Result<UploadOutcome, UploadError> {
        match self.transfer_and_merge(fingerprint_name).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if !matches!(
                    self.state(),
                    UploadState::Transferring | UploadState::Paused
                ) {
                    self.set_state(UploadState::Transferring);
                }
                warn!(name = %fingerprint_name, error = %e, "upload halted, resume to continue");
                self.emit(UploadEvent::Failed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn transfer_and_merge(&self, fingerprint_name: &str) -> Result<UploadOutcome, UploadError> {
        let verified = self.api.verify(fingerprint_name).await?;

        if !verified.need_upload {
            info!(name = %fingerprint_name, "already stored, nothing to send");
            return Ok(self.complete(fingerprint_name, true));
        }

        let pending: Vec<Part> = {
            let mut status = self.status.write();
            for part in &mut status.parts {
                part.set_loaded(verified.stored_size(&part.name));
            }
            status
                .parts
                .iter()
                .filter(|p| !p.is_complete())
                .cloned()
                .collect()
        };

        let cancel = self.shutdown.child_token();
        *self.transfer.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();
        self.speed.reset();
        self.set_state(UploadState::Transferring);
        info!(
            name = %fingerprint_name,
            pending = pending.len(),
            staged = verified.uploaded_list.len(),
            "transferring"
        );

        let path = match self.status.read().file.as_ref() {
            Some(file) => file.path.clone(),
            None => return Err(UploadError::InvalidState("no file selected".into())),
        };
        let manager = PartTransferManager::new(
            self.api.clone(),
            path,
            self.status.clone(),
            self.events_tx.clone(),
            self.speed.clone(),
        );

        let mut transfers: FuturesUnordered<_> = pending
            .into_iter()
            .map(|part| {
                let manager = manager.clone();
                let name = fingerprint_name.to_string();
                let token = cancel.child_token();
                tokio::spawn(async move {
                    let start = part.loaded;
                    manager.send(&part, &name, start, token).await
                })
            })
            .collect();

        // All parts must succeed. Siblings of a failed part keep running
        // and are drained before the first failure is reported.
        let mut first_error = None;
        while let Some(joined) = transfers.next().await {
            let result = joined.unwrap_or_else(|e| Err(UploadError::Task(e.to_string())));
            if let Err(e) = result
                && first_error.is_none()
            {
                first_error = Some(e);
            }
        }

        if cancel.is_cancelled() {
            if self.shutdown.is_cancelled() {
                return Err(UploadError::Cancelled);
            }
            return Ok(UploadOutcome::Paused);
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        // A pause that arrived after the last part finished still wins; the
        // next resume finds every part stored and goes straight to merge.
        if !self.advance(UploadState::Transferring, UploadState::Merging) {
            info!(name = %fingerprint_name, "paused before merge");
            return Ok(UploadOutcome::Paused);
        }
        self.api.merge(fingerprint_name, self.config.part_size).await?;
        info!(name = %fingerprint_name, "upload complete");
        Ok(self.complete(fingerprint_name, false))
    }

    /// Marks the upload done and schedules the client-side reset.
    fn complete(&self, fingerprint_name: &str, instant: bool) -> UploadOutcome {
        let generation = {
            let mut status = self.status.write();
            for part in &mut status.parts {
                part.set_loaded(part.size());
            }
            status.generation
        };
        self.set_state(UploadState::Done);
        self.emit(UploadEvent::Progress {
            percent: 100.0,
            bytes_per_second: self.speed.bytes_per_second(),
            eta: None,
        });
        self.emit(UploadEvent::Completed {
            fingerprint_name: fingerprint_name.to_string(),
            instant,
        });

        let status = self.status.clone();
        let delay = self.config.reset_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut status = status.write();
            if status.state == UploadState::Done && status.generation == generation {
                *status = UploadStatus {
                    generation,
                    ..Default::default()
                };
            }
        });

        UploadOutcome::Done {
            fingerprint_name: fingerprint_name.to_string(),
            instant,
        }
    }

    fn reset(&self) {
        let mut status = self.status.write();
        let generation = status.generation;
        *status = UploadStatus {
            generation,
            ..Default::default()
        };
    }

    fn current_transfer(&self) -> CancellationToken {
        self.transfer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Moves from `from` to `to` only if the state is still `from`.
    fn advance(&self, from: UploadState, to: UploadState) -> bool {
        {
            let mut status = self.status.write();
            if status.state != from {
                return false;
            }
            status.state = to;
        }
        debug!(state = %to, "state changed");
        self.emit(UploadEvent::StateChanged(to));
        true
    }

    fn set_state(&self, state: UploadState) {
        self.status.write().state = state;
        debug!(%state, "state changed");
        self.emit(UploadEvent::StateChanged(state));
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.try_send(event);
    }
}
