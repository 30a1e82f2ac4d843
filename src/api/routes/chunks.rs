//! Audio chunk ingestion endpoint.
//!
//! Accepts a multipart upload (`room`, `user`, optional `email`, `file`),
//! transcribes the chunk and appends the transcript to the uploader's
//! per-room file. The chunk itself is transient: it lives in a temp file
//! for the duration of the transcription call only.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Value};
use std::io::Write;
use tracing::{debug, info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;

/// Bodies smaller than this are malformed fragments from the client
/// recorder, not audio worth uploading.
pub const MIN_CHUNK_BYTES: usize = 100;

/// Uploads are capped well above any real chunk size.
const MAX_CHUNK_BYTES: usize = 50 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chunks", post(ingest_chunk))
        .layer(DefaultBodyLimit::max(MAX_CHUNK_BYTES))
        .with_state(state)
}

struct ChunkUpload {
    room: String,
    user: String,
    file_name: String,
    bytes: Vec<u8>,
}

/// POST /chunks - Transcribe one audio chunk and append the result.
async fn ingest_chunk(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let upload = read_upload(multipart).await?;

    if upload.bytes.len() < MIN_CHUNK_BYTES {
        // Reject before anything touches the filesystem.
        return Err(ApiError::bad_request(format!(
            "Audio chunk too small: {} bytes (minimum {})",
            upload.bytes.len(),
            MIN_CHUNK_BYTES
        )));
    }

    info!(
        room = %upload.room,
        user = %upload.user,
        bytes = upload.bytes.len(),
        "Received audio chunk"
    );

    let temp = write_temp_chunk(&upload.file_name, &upload.bytes)?;

    let result = state.speech.transcribe(temp.path()).await;
    // The temp file is removed on drop regardless of the outcome.
    let transcription = result.map_err(ApiError::from)?;

    if !transcription.text.trim().is_empty() {
        state
            .store
            .append(
                &upload.room,
                &upload.user,
                &upload.user,
                &transcription.text,
            )
            .await
            .map_err(ApiError::from)?;
    } else {
        debug!(room = %upload.room, "Empty transcription, nothing appended");
    }

    Ok(Json(json!({
        "success": true,
        "transcript": transcription.text,
        "retried": transcription.retried,
        "transcoded": transcription.transcoded,
    })))
}

async fn read_upload(mut multipart: Multipart) -> ApiResult<ChunkUpload> {
    let mut room = None;
    let mut user = None;
    let mut file_name = "chunk.webm".to_string();
    let mut bytes = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart: {}", e)))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "room" => room = Some(read_text_field(field).await?),
            "user" => user = Some(read_text_field(field).await?),
            // Accepted for interface compatibility; delivery addressing
            // happens at finalize time.
            "email" => {
                let _ = read_text_field(field).await?;
            }
            "file" => {
                if let Some(name) = field.file_name() {
                    file_name = name.to_string();
                }
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| {
                            ApiError::bad_request(format!("Failed to read chunk bytes: {}", e))
                        })?
                        .to_vec(),
                );
            }
            other => warn!("Ignoring unknown multipart field {:?}", other),
        }
    }

    let room = room
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing room identifier"))?;
    let user = user
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing user identifier"))?;
    let bytes = bytes.ok_or_else(|| ApiError::bad_request("Missing audio chunk"))?;

    Ok(ChunkUpload {
        room,
        user,
        file_name,
        bytes,
    })
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read field: {}", e)))
}

/// Persist the chunk to a temp file keeping its original extension so the
/// transcription client can infer the container format.
fn write_temp_chunk(file_name: &str, bytes: &[u8]) -> ApiResult<tempfile::NamedTempFile> {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("webm");

    let mut temp = tempfile::Builder::new()
        .prefix("minuta-chunk-")
        .suffix(&format!(".{}", extension))
        .tempfile()
        .map_err(|e| ApiError::internal(format!("Failed to create temp file: {}", e)))?;

    temp.write_all(bytes)
        .map_err(|e| ApiError::internal(format!("Failed to write temp file: {}", e)))?;

    Ok(temp)
}
