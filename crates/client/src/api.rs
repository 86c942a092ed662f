//! Transport seam between the upload logic and the server.
//!
//! [`UploadApi`] keeps the coordinator independent of HTTP so it can be
//! driven against an in-process store in tests. [`HttpUploadApi`] is the
//! `reqwest` implementation.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use chunkdrop_protocol::{ApiResponse, VerifyResponse, routes};
use chunkdrop_transfer::PartStream;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::UploadError;

/// Future returned by [`UploadApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// Requests of the upload protocol.
pub trait UploadApi: Send + Sync {
    /// Asks whether `fingerprint_name` is stored and which parts are staged.
    fn verify<'a>(&'a self, fingerprint_name: &'a str) -> ApiFuture<'a, VerifyResponse>;

    /// Streams `body` into `part_name`, written from `start` on the server.
    fn upload_part<'a>(
        &'a self,
        fingerprint_name: &'a str,
        start: u64,
        part_name: &'a str,
        body: PartStream,
    ) -> ApiFuture<'a, ()>;

    /// Asks the server to assemble the staged parts with the given stride.
    fn merge<'a>(&'a self, fingerprint_name: &'a str, stride: u64) -> ApiFuture<'a, ()>;

    /// Sends a small file in one form request, stored as `public/{name}`.
    fn whole_upload<'a>(&'a self, path: &'a Path, name: &'a str) -> ApiFuture<'a, ()>;
}

/// HTTP implementation of [`UploadApi`].
#[derive(Debug, Clone)]
pub struct HttpUploadApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpUploadApi {
    /// Creates a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Uses an existing `reqwest` client.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Decodes the `{code, msg, data}` envelope of `resp`.
///
/// A non-success application code becomes [`UploadError::Protocol`] even
/// when the transport status is an error; a body that is not an envelope is
/// reported with its HTTP status.
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, UploadError> {
    let status = resp.status();
    let body = resp.bytes().await?;

    let envelope: ApiResponse<serde_json::Value> = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => return Err(e.into()),
        Err(_) => {
            return Err(UploadError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
    };

    let data = envelope
        .into_result()
        .map_err(|(code, msg)| UploadError::Protocol { code, msg })?;
    Ok(serde_json::from_value(data)?)
}

impl UploadApi for HttpUploadApi {
    fn verify<'a>(&'a self, fingerprint_name: &'a str) -> ApiFuture<'a, VerifyResponse> {
        Box::pin(async move {
            let resp = self
                .http
                .get(self.url(&routes::verify_path(fingerprint_name)))
                .send()
                .await?;
            decode(resp).await
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
            let url = self.url(&routes::part_path(fingerprint_name, start, part_name));
            debug!(part = %part_name, start, "sending part");
            let resp = self
                .http
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(reqwest::Body::wrap_stream(body))
                .send()
                .await?;
            decode::<bool>(resp).await.map(|_| ())
        })
    }

    fn merge<'a>(&'a self, fingerprint_name: &'a str, stride: u64) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let resp = self
                .http
                .get(self.url(&routes::merge_path(fingerprint_name)))
                .query(&[("size", stride)])
                .send()
                .await?;
            decode::<bool>(resp).await.map(|_| ())
        })
    }

    fn whole_upload<'a>(&'a self, path: &'a Path, name: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let file = tokio::fs::File::open(path).await?;
            let len = file.metadata().await?.len();
            let stream = tokio_util::io::ReaderStream::new(file);
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.to_string());

            let form = reqwest::multipart::Form::new()
                .text("name", name.to_string())
                .part(
                    "file",
                    reqwest::multipart::Part::stream_with_length(
                        reqwest::Body::wrap_stream(stream),
                        len,
                    )
                    .file_name(file_name),
                );

            let resp = self
                .http
                .post(self.url(routes::WHOLE_UPLOAD))
                .multipart(form)
                .send()
                .await?;
            decode::<bool>(resp).await.map(|_| ())
        })
    }
}
