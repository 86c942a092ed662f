//! In-process [`UploadApi`] backed by the server's storage layer.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chunkdrop_protocol::{VerifyResponse, parse_part_index};
use chunkdrop_server::Storage;
use chunkdrop_transfer::PartStream;
use futures_util::StreamExt;
use tokio::sync::{Notify, watch};

use crate::api::{ApiFuture, UploadApi};
use crate::error::UploadError;

#[derive(Clone)]
pub(crate) struct StorageApi {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Storage,
    /// Parts with an index at or above this value wait for the gate.
    gate_from: AtomicUsize,
    gate: watch::Sender<bool>,
    verify_gate: watch::Sender<bool>,
    blocked: Notify,
    failures: AtomicUsize,
    sent: AtomicU64,
    verify_calls: AtomicUsize,
    part_calls: AtomicUsize,
    merge_calls: AtomicUsize,
}

fn storage_error(e: chunkdrop_server::StorageError) -> UploadError {
    UploadError::Protocol {
        code: chunkdrop_protocol::CODE_FAIL,
        msg: e.to_string(),
    }
}

impl StorageApi {
    pub(crate) async fn new(root: &Path) -> Self {
        let storage = Storage::new(root.join("srv/public"), root.join("srv/temp"))
            .await
            .unwrap();
        let (gate, _) = watch::channel(true);
        let (verify_gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                storage,
                gate_from: AtomicUsize::new(0),
                gate,
                verify_gate,
                blocked: Notify::new(),
                failures: AtomicUsize::new(0),
                sent: AtomicU64::new(0),
                verify_calls: AtomicUsize::new(0),
                part_calls: AtomicUsize::new(0),
                merge_calls: AtomicUsize::new(0),
            }),
        }
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    /// Holds every part request until [`open_gate`](Self::open_gate).
    pub(crate) fn close_gate(&self) {
        self.close_gate_from(0);
    }

    /// Holds part requests with an index of at least `index`.
    pub(crate) fn close_gate_from(&self, index: usize) {
        self.inner.gate_from.store(index, Ordering::SeqCst);
        self.inner.gate.send_replace(false);
    }

    pub(crate) fn open_gate(&self) {
        self.inner.gate.send_replace(true);
    }

    /// Holds verify requests until [`open_verify_gate`](Self::open_verify_gate).
    pub(crate) fn close_verify_gate(&self) {
        self.inner.verify_gate.send_replace(false);
    }

    pub(crate) fn open_verify_gate(&self) {
        self.inner.verify_gate.send_replace(true);
    }

    pub(crate) async fn wait_for_blocked_request(&self) {
        self.inner.blocked.notified().await;
    }

    /// Makes the next `n` part requests fail after the gate.
    pub(crate) fn fail_next_parts(&self, n: usize) {
        self.inner.failures.store(n, Ordering::SeqCst);
    }

    pub(crate) fn sent_bytes(&self) -> u64 {
        self.inner.sent.load(Ordering::SeqCst)
    }

    pub(crate) fn verify_calls(&self) -> usize {
        self.inner.verify_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn part_calls(&self) -> usize {
        self.inner.part_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn merge_calls(&self) -> usize {
        self.inner.merge_calls.load(Ordering::SeqCst)
    }

    pub(crate) async fn stage(&self, fingerprint_name: &str, part_name: &str, data: &[u8]) {
        let body = futures_util::stream::iter(vec![Ok(bytes::Bytes::copy_from_slice(data))]);
        self.inner
            .storage
            .receive_part(fingerprint_name, 0, part_name, body)
            .await
            .unwrap();
    }

    pub(crate) fn staged(&self, fingerprint_name: &str, part_name: &str) -> Vec<u8> {
        std::fs::read(self.inner.storage.staging_dir(fingerprint_name).join(part_name)).unwrap()
    }

    pub(crate) fn artifact(&self, fingerprint_name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.inner.storage.artifact_path(fingerprint_name)).ok()
    }

    async fn pass_gate(&self, part_name: &str) {
        let index = parse_part_index(part_name).unwrap_or(0);
        if index < self.inner.gate_from.load(Ordering::SeqCst) {
            return;
        }
        self.wait_open(&self.inner.gate).await;
    }

    async fn wait_open(&self, gate: &watch::Sender<bool>) {
        let mut rx = gate.subscribe();
        let mut notified = false;
        loop {
            let open = *rx.borrow_and_update();
            if open {
                return;
            }
            if !notified {
                self.inner.blocked.notify_one();
                notified = true;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn take_failure(&self) -> bool {
        self.inner
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl UploadApi for StorageApi {
    fn verify<'a>(&'a self, fingerprint_name: &'a str) -> ApiFuture<'a, VerifyResponse> {
        Box::pin(async move {
            self.inner.verify_calls.fetch_add(1, Ordering::SeqCst);
            self.wait_open(&self.inner.verify_gate).await;
            self.inner
                .storage
                .verify(fingerprint_name)
                .await
                .map_err(storage_error)
        })
    }

    fn upload_part<'a>(
        &'a self,
        fingerprint_name: &'a str,
        start: u64,
        part_name: &'a str,
        body: PartStream,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.inner.part_calls.fetch_add(1, Ordering::SeqCst);
            self.pass_gate(part_name).await;
            if self.take_failure() {
                return Err(UploadError::Protocol {
                    code: chunkdrop_protocol::CODE_FAIL,
                    msg: "injected failure".into(),
                });
            }

            let inner = self.inner.clone();
            let counted = body.inspect(move |chunk| {
                if let Ok(bytes) = chunk {
                    inner.sent.fetch_add(bytes.len() as u64, Ordering::SeqCst);
                }
            });
            self.inner
                .storage
                .receive_part(fingerprint_name, start, part_name, counted)
                .await
                .map_err(storage_error)?;
            Ok(())
        })
    }

    fn merge<'a>(&'a self, fingerprint_name: &'a str, stride: u64) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.inner.merge_calls.fetch_add(1, Ordering::SeqCst);
            self.inner
                .storage
                .merge(fingerprint_name, stride)
                .await
                .map_err(storage_error)?;
            Ok(())
        })
    }

    fn whole_upload<'a>(&'a self, path: &'a Path, name: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let file = tokio::fs::File::open(path).await?;
            let body = tokio_util::io::ReaderStream::new(file);
            self.inner
                .storage
                .store_whole(name, body)
                .await
                .map_err(storage_error)?;
            Ok(())
        })
    }
}
