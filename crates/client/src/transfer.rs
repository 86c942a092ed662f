//! Sends the unsent suffix of one part over its own cancellable request.

use std::path::PathBuf;
use std::sync::Arc;

use chunkdrop_transfer::{Part, SpeedCalculator, aggregate_percent, open_part_stream};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::UploadApi;
use crate::error::UploadError;
use crate::types::{SharedStatus, UploadEvent};

/// Uploads parts of one file and keeps their progress in the shared status.
#[derive(Clone)]
pub struct PartTransferManager {
    api: Arc<dyn UploadApi>,
    path: PathBuf,
    status: SharedStatus,
    events_tx: mpsc::Sender<UploadEvent>,
    speed: Arc<SpeedCalculator>,
}

impl PartTransferManager {
    pub fn new(
        api: Arc<dyn UploadApi>,
        path: PathBuf,
        status: SharedStatus,
        events_tx: mpsc::Sender<UploadEvent>,
        speed: Arc<SpeedCalculator>,
    ) -> Self {
        Self {
            api,
            path,
            status,
            events_tx,
            speed,
        }
    }

    /// Sends bytes `start_offset..part.size()` of `part`.
    ///
    /// Cancelling `cancel` drops the in-flight request and returns
    /// [`UploadError::Cancelled`]; the part keeps the progress it reached.
    /// On success the part is marked complete.
    pub async fn send(
        &self,
        part: &Part,
        fingerprint_name: &str,
        start_offset: u64,
        cancel: CancellationToken,
    ) -> Result<(), UploadError> {
        let index = part.index();
        let stream = open_part_stream(&self.path, part.range, start_offset).await?;

        let tracker = self.clone();
        let mut loaded = start_offset;
        let counted = stream.inspect(move |chunk| {
            if let Ok(bytes) = chunk {
                loaded += bytes.len() as u64;
                tracker.speed.add_sample(bytes.len() as u64);
                tracker.record(index, loaded);
            }
        });

        debug!(part = %part.name, start_offset, size = part.size(), "part transfer started");
        let request = self
            .api
            .upload_part(fingerprint_name, start_offset, &part.name, Box::pin(counted));

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(part = %part.name, "part transfer cancelled");
                Err(UploadError::Cancelled)
            }
            result = request => {
                match &result {
                    Ok(()) => self.record(index, part.size()),
                    Err(e) => warn!(part = %part.name, error = %e, "part transfer failed"),
                }
                result
            }
        }
    }

    /// Stores `loaded` for part `index` and emits progress events.
    fn record(&self, index: usize, loaded: u64) {
        let (part_event, percent, remaining) = {
            let mut status = self.status.write();
            let Some(part) = status.parts.get_mut(index) else {
                return;
            };
            part.set_loaded(loaded);
            let event = UploadEvent::PartProgress {
                index,
                loaded: part.loaded,
                percent: part.percent,
            };
            let remaining: u64 = status.parts.iter().map(Part::remaining).sum();
            (event, aggregate_percent(&status.parts), remaining)
        };

        let _ = self.events_tx.try_send(part_event);
        let _ = self.events_tx.try_send(UploadEvent::Progress {
            percent,
            bytes_per_second: self.speed.bytes_per_second(),
            eta: self.speed.eta(remaining),
        });
    }
}
