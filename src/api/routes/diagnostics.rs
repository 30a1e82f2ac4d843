//! Transcript diagnostics endpoint for operator troubleshooting.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/transcripts/:room", get(list_transcripts))
        .with_state(state)
}

/// GET /transcripts/:room - Transcript files for a room across every
/// storage root, with a short line preview per file.
async fn list_transcripts(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> ApiResult<Json<Value>> {
    let files = state.store.list(&room).await.map_err(ApiError::from)?;

    Ok(Json(json!({
        "room": room,
        "count": files.len(),
        "files": files,
    })))
}
