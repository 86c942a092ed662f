fn main() {
    println!("Run `cargo test -p e2e` to execute the end-to-end upload tests.");
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use chunkdrop_client::{
        ApiFuture, ClientConfig, HttpUploadApi, UploadApi, UploadCoordinator, UploadError,
        UploadOutcome,
    };
    use chunkdrop_protocol::VerifyResponse;
    use chunkdrop_server::{AppState, ServerConfig};
    use chunkdrop_transfer::{PartRange, PartStream, checksum_bytes, chunk, open_part_stream};
    use futures_util::StreamExt;
    use tokio_util::sync::CancellationToken;

    /// A server on an ephemeral port, stopped on drop.
    struct TestServer {
        base_url: String,
        data: tempfile::TempDir,
        shutdown: CancellationToken,
    }

    impl TestServer {
        async fn start(merge_stride: u64) -> Self {
            let data = tempfile::tempdir().unwrap();
            let config = ServerConfig {
                data_dir: data.path().to_path_buf(),
                merge_stride,
                ..Default::default()
            };
            let state = AppState::from_config(config).await.unwrap();
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());

            let shutdown = CancellationToken::new();
            let stop = shutdown.clone();
            tokio::spawn(async move {
                chunkdrop_server::serve(listener, state, async move { stop.cancelled().await })
                    .await
                    .unwrap();
            });
            Self {
                base_url,
                data,
                shutdown,
            }
        }

        fn artifact(&self, name: &str) -> Option<Vec<u8>> {
            std::fs::read(self.data.path().join("public").join(name)).ok()
        }

        fn staging(&self, name: &str) -> PathBuf {
            self.data.path().join("temp").join(name)
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.shutdown.cancel();
        }
    }

    /// Counts part requests and body bytes on top of the HTTP client.
    #[derive(Clone)]
    struct Counting {
        http: HttpUploadApi,
        parts: Arc<AtomicUsize>,
        bytes: Arc<AtomicU64>,
    }

    impl Counting {
        fn new(base_url: &str) -> Self {
            Self {
                http: HttpUploadApi::new(base_url).unwrap(),
                parts: Arc::default(),
                bytes: Arc::default(),
            }
        }
    }

    impl UploadApi for Counting {
        fn verify<'a>(&'a self, fingerprint_name: &'a str) -> ApiFuture<'a, VerifyResponse> {
            self.http.verify(fingerprint_name)
        }

        fn upload_part<'a>(
            &'a self,
            fingerprint_name: &'a str,
            start: u64,
            part_name: &'a str,
            body: PartStream,
        ) -> ApiFuture<'a, ()> {
            self.parts.fetch_add(1, Ordering::SeqCst);
            let bytes = self.bytes.clone();
            let counted = body.inspect(move |chunk| {
                if let Ok(b) = chunk {
                    bytes.fetch_add(b.len() as u64, Ordering::SeqCst);
                }
            });
            self.http
                .upload_part(fingerprint_name, start, part_name, Box::pin(counted))
        }

        fn merge<'a>(&'a self, fingerprint_name: &'a str, stride: u64) -> ApiFuture<'a, ()> {
            self.http.merge(fingerprint_name, stride)
        }

        fn whole_upload<'a>(&'a self, path: &'a Path, name: &'a str) -> ApiFuture<'a, ()> {
            self.http.whole_upload(path, name)
        }
    }

    fn write_sample(dir: &Path, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i * 13 % 253) as u8).collect();
        let path = dir.join(name);
        std::fs::write(&path, &data).unwrap();
        (path, data)
    }

    fn client_config(base_url: &str, part_size: u64) -> ClientConfig {
        ClientConfig {
            base_url: base_url.to_string(),
            part_size,
            reset_delay_ms: 10,
            ..Default::default()
        }
    }

    /// Fingerprint name computed in one pass over the whole content.
    fn fingerprint_name(data: &[u8], ext: &str) -> String {
        format!("{}{ext}", checksum_bytes(data))
    }

    #[tokio::test]
    async fn upload_over_http() {
        let server = TestServer::start(64 * 1024).await;
        let dir = tempfile::tempdir().unwrap();
        let (path, data) = write_sample(dir.path(), "movie.mp4", 200_000);

        let api = Counting::new(&server.base_url);
        let coord = UploadCoordinator::new(
            client_config(&server.base_url, 64 * 1024),
            Arc::new(api.clone()),
        );
        let outcome = coord.upload(&path).await.unwrap();
        let UploadOutcome::Done {
            fingerprint_name: name,
            instant: false,
        } = outcome
        else {
            panic!("unexpected outcome {outcome:?}");
        };

        assert_eq!(server.artifact(&name).unwrap(), data);
        assert!(!server.staging(&name).exists());
        assert_eq!(api.parts.load(Ordering::SeqCst), 4);
        assert_eq!(api.bytes.load(Ordering::SeqCst), 200_000);
    }

    #[tokio::test]
    async fn reupload_is_instant() {
        let server = TestServer::start(1024).await;
        let dir = tempfile::tempdir().unwrap();
        let (path, data) = write_sample(dir.path(), "pic.png", 5000);

        let api = Counting::new(&server.base_url);
        let coord =
            UploadCoordinator::new(client_config(&server.base_url, 1024), Arc::new(api.clone()));
        coord.upload(&path).await.unwrap();
        let sent = api.parts.load(Ordering::SeqCst);

        let http = HttpUploadApi::new(&server.base_url).unwrap();
        let name = fingerprint_name(&data, ".png");
        let verified = http.verify(&name).await.unwrap();
        assert!(!verified.need_upload);
        assert!(verified.uploaded_list.is_empty());

        let outcome = coord.upload(&path).await.unwrap();
        assert!(matches!(outcome, UploadOutcome::Done { instant: true, .. }));
        assert_eq!(api.parts.load(Ordering::SeqCst), sent);
        assert!(!server.staging(&name).exists());
    }

    /// Three parts (full, full, half). Parts 0 and 1 complete, part 2 stops
    /// at 40 % of its size; resuming sends only the rest of part 2.
    #[tokio::test]
    async fn interrupted_upload_resumes_remainder() {
        const PART: u64 = 10_000;
        let server = TestServer::start(PART).await;
        let dir = tempfile::tempdir().unwrap();
        let len = PART * 2 + PART / 2;
        let (path, data) = write_sample(dir.path(), "talk.mp4", len as usize);
        let name = fingerprint_name(&data, ".mp4");
        let http = HttpUploadApi::new(&server.base_url).unwrap();

        let verified = http.verify(&name).await.unwrap();
        assert!(verified.need_upload);
        assert!(verified.uploaded_list.is_empty());

        let ranges = chunk(len, PART).unwrap();
        assert_eq!(ranges.len(), 3);
        for range in &ranges[..2] {
            let body = open_part_stream(&path, *range, 0).await.unwrap();
            http.upload_part(&name, 0, &format!("{name}-{}", range.index), body)
                .await
                .unwrap();
        }
        let cut = ranges[2].size * 2 / 5;
        let partial = PartRange {
            size: cut,
            ..ranges[2]
        };
        let body = open_part_stream(&path, partial, 0).await.unwrap();
        http.upload_part(&name, 0, &format!("{name}-2"), body)
            .await
            .unwrap();

        let verified = http.verify(&name).await.unwrap();
        let sizes: Vec<u64> = verified.uploaded_list.iter().map(|p| p.size).collect();
        assert_eq!(sizes, vec![PART, PART, cut]);

        let api = Counting::new(&server.base_url);
        let coord =
            UploadCoordinator::new(client_config(&server.base_url, PART), Arc::new(api.clone()));
        coord.upload(&path).await.unwrap();

        assert_eq!(api.parts.load(Ordering::SeqCst), 1);
        assert_eq!(api.bytes.load(Ordering::SeqCst), ranges[2].size - cut);
        let artifact = server.artifact(&name).unwrap();
        assert_eq!(artifact.len() as u64, len);
        assert_eq!(artifact, data);
    }

    #[tokio::test]
    async fn merge_with_missing_part_is_protocol_error() {
        let server = TestServer::start(100).await;
        let dir = tempfile::tempdir().unwrap();
        let (path, data) = write_sample(dir.path(), "a.gif", 250);
        let name = fingerprint_name(&data, ".gif");
        let http = HttpUploadApi::new(&server.base_url).unwrap();

        // Part 1 never arrives.
        let ranges = chunk(250, 100).unwrap();
        for range in [ranges[0], ranges[2]] {
            let body = open_part_stream(&path, range, 0).await.unwrap();
            http.upload_part(&name, 0, &format!("{name}-{}", range.index), body)
                .await
                .unwrap();
        }

        let err = http.merge(&name, 100).await.unwrap_err();
        assert!(matches!(err, UploadError::Protocol { code: 1, .. }));
        assert!(server.artifact(&name).is_none());
        assert!(server.staging(&name).exists());
    }

    #[tokio::test]
    async fn whole_upload_then_download() {
        let server = TestServer::start(1024).await;
        let dir = tempfile::tempdir().unwrap();
        let (path, data) = write_sample(dir.path(), "icon.png", 3000);

        let http = HttpUploadApi::new(&server.base_url).unwrap();
        http.whole_upload(&path, "logo.png").await.unwrap();
        assert_eq!(server.artifact("logo.png").unwrap(), data);

        let served = reqwest::get(format!("{}/logo.png", server.base_url))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(&served[..], &data[..]);
    }
}
