//! HTTP handlers of the upload protocol.

use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use chunkdrop_protocol::{ApiResponse, MergeParams, VerifyResponse};
use futures_util::TryStreamExt;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult, StorageError};
use crate::state::AppState;
use crate::storage::{MergeOutcome, ReceiveOutcome, Spooled};

/// `GET /verify/{fingerprint_name}`
pub async fn verify(
    State(state): State<AppState>,
    Path(fingerprint_name): Path<String>,
) -> ApiResult<Json<ApiResponse<VerifyResponse>>> {
    let resp = state.storage.verify(&fingerprint_name).await?;
    debug!(
        name = %fingerprint_name,
        need_upload = resp.need_upload,
        staged = resp.uploaded_list.len(),
        "verify"
    );
    Ok(Json(ApiResponse::ok("verified", resp)))
}

/// `POST /part/{fingerprint_name}/{start}/{part_name}`
///
/// The raw request body is streamed into the part file.
pub async fn upload_part(
    State(state): State<AppState>,
    Path((fingerprint_name, start, part_name)): Path<(String, u64, String)>,
    body: Body,
) -> ApiResult<Json<ApiResponse<bool>>> {
    let stream = body.into_data_stream().map_err(std::io::Error::other);
    let outcome = state
        .storage
        .receive_part(&fingerprint_name, start, &part_name, stream)
        .await?;

    let msg = match outcome {
        ReceiveOutcome::Stored { .. } => "part stored",
        ReceiveOutcome::AlreadyMerged => "already merged",
    };
    Ok(Json(ApiResponse::ok(msg, true)))
}

/// `GET /merge/{fingerprint_name}?size={stride}`
pub async fn merge(
    State(state): State<AppState>,
    Path(fingerprint_name): Path<String>,
    Query(params): Query<MergeParams>,
) -> ApiResult<Json<ApiResponse<bool>>> {
    let stride = params.size.unwrap_or(state.config.merge_stride);
    let outcome = state.storage.merge(&fingerprint_name, stride).await?;

    let msg = match outcome {
        MergeOutcome::Merged { .. } => "merged",
        MergeOutcome::AlreadyMerged => "already merged",
    };
    Ok(Json(ApiResponse::ok(msg, true)))
}

/// `POST /wholeUpload` with form fields `file` and `name`.
///
/// Fields may arrive in either order; the file is spooled to disk and moved
/// to `public/{name}` once both are known.
pub async fn whole_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ApiResponse<bool>>> {
    let mut name: Option<String> = None;
    let mut spooled: Option<Spooled> = None;

    let result = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("malformed form: {e}")))?
        {
            match field.name() {
                Some("name") => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("name field: {e}")))?;
                    name = Some(text);
                }
                Some("file") => {
                    let stream = Box::pin(field.map_err(std::io::Error::other));
                    if let Some(previous) = spooled.replace(state.storage.spool(stream).await?) {
                        previous.discard().await;
                    }
                }
                _ => {}
            }
        }
        Ok::<_, ApiError>(())
    }
    .await;

    if let Err(e) = result {
        if let Some(file) = spooled {
            file.discard().await;
        }
        return Err(e);
    }

    let Some(file) = spooled else {
        return Err(StorageError::MissingField("file").into());
    };
    let Some(name) = name else {
        file.discard().await;
        return Err(StorageError::MissingField("name").into());
    };

    let bytes = state.storage.publish(file, &name).await?;
    info!(name = %name, bytes, "whole upload complete");
    Ok(Json(ApiResponse::ok("uploaded", true)))
}
