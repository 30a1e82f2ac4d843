//! Test email endpoint: exercises the delivery path end to end without a
//! real transcript.

use axum::{extract::State, response::Json, routing::post, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::mail::render_summary_email;

#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub participants: Vec<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/test-email", post(send_test_email))
        .with_state(state)
}

/// POST /test-email - Render and send a summary-style email.
async fn send_test_email(
    State(state): State<AppState>,
    Json(request): Json<TestEmailRequest>,
) -> ApiResult<Json<Value>> {
    if request.to.trim().is_empty() {
        return Err(ApiError::bad_request("Missing recipient address"));
    }

    let mailer = state
        .mailer
        .as_ref()
        .ok_or_else(|| ApiError::internal("No mailer configured"))?;

    let participants: BTreeSet<String> = request.participants.iter().cloned().collect();
    let html = render_summary_email("prueba", &participants, &request.body);

    mailer
        .send(&request.to, &request.subject, &html)
        .await
        .map_err(ApiError::from)?;

    info!("Test email sent to {}", request.to);

    Ok(Json(json!({
        "success": true,
        "to": request.to,
    })))
}
