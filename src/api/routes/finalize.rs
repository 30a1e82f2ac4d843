//! Meeting finalization endpoint.
//!
//! Aggregates the room's transcript files (or one owner's file when the
//! request names a user), normalizes the text, asks the
//! summary provider for a structured summary, resolves recipients through
//! the tiered fallback chain and emails the result. Transcript files are
//! deleted only when every attempted delivery succeeded; finalize itself
//! reports success once a summary was computed, whatever the delivery
//! outcome.

use axum::{extract::State, response::Json, routing::post, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::delivery::{deliver_summary, DeliveryReport, RecipientResolver};
use crate::mail::render_summary_email;

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub room: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/finalize", post(finalize))
        .with_state(state)
}

/// POST /finalize - Summarize a room's transcript and deliver it.
async fn finalize(
    State(state): State<AppState>,
    Json(request): Json<FinalizeRequest>,
) -> ApiResult<Json<Value>> {
    if request.room.trim().is_empty() {
        return Err(ApiError::bad_request("Missing room identifier"));
    }

    info!(room = %request.room, "Finalizing meeting");

    // The caller's own file when a user is given, the whole room
    // otherwise.
    let owner = request
        .user
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty());
    let aggregate = state
        .store
        .aggregate(&request.room, owner)
        .await
        .map_err(ApiError::from)?;

    if aggregate.is_empty() {
        info!(room = %request.room, "Nothing to finalize, no transcript files");
        return Ok(Json(json!({
            "success": true,
            "summary": "",
            "transcript": "",
            "provider_status": 0,
            "recipients": [],
            "delivered": [],
        })));
    }

    let normalized = state.normalizer.normalize(&aggregate.text);
    let summary = state
        .summarizer
        .summarize(&normalized.participants, &normalized.text)
        .await;

    // An explicit address settles the first tier, so the registry is
    // never queried in that case.
    let registry_participants = match RecipientResolver::explicit_recipient(request.email.as_deref())
    {
        Some(_) => None,
        None => state.registry.participants(&request.room).await,
    };
    let recipients = state.resolver.resolve(
        request.email.as_deref(),
        registry_participants,
        &aggregate.text,
    );

    let report = match (&state.mailer, recipients.is_empty()) {
        (Some(mailer), false) => {
            let subject = format!("Resumen de la reunión {}", request.room);
            let html = render_summary_email(&request.room, &normalized.participants, &summary.text);
            deliver_summary(mailer.as_ref(), &recipients, &subject, &html).await
        }
        (None, false) => {
            warn!("No mailer configured, summary not delivered");
            DeliveryReport::default()
        }
        (_, true) => {
            // Terminal success state: summary computed, nobody to send to.
            info!(room = %request.room, "No recipients resolved, summary not delivered");
            DeliveryReport::default()
        }
    };

    if report.allows_cleanup() {
        state.store.delete(&aggregate.files).await;
    } else if report.attempted() > 0 {
        warn!(
            room = %request.room,
            failed = report.failed.len(),
            "Partial delivery failure, keeping transcript files for retry"
        );
    }

    Ok(Json(json!({
        "success": true,
        "summary": summary.text,
        "transcript": normalized.text,
        "provider_status": summary.provider_status,
        "recipients": recipients,
        "delivered": report.delivered,
    })))
}
