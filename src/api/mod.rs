//! REST API server for Minuta.
//!
//! Provides HTTP endpoints for:
//! - Audio chunk ingestion (transcribe + append)
//! - Meeting finalization (aggregate, summarize, deliver)
//! - Transcript diagnostics
//! - Test email delivery

pub mod error;
pub mod routes;

use crate::config::Config;
use crate::delivery::{RecipientResolver, RegistryClient};
use crate::mail::Mailer;
use crate::normalizer::SpeakerNormalizer;
use crate::store::TranscriptStorage;
use crate::summary::SummaryClient;
use crate::transcription::SpeechClient;
use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Shared handler state: every component behind an Arc so concurrent
/// chunk uploads and finalize calls run fully independently.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TranscriptStorage>,
    pub speech: Arc<SpeechClient>,
    pub summarizer: Arc<SummaryClient>,
    pub registry: Arc<RegistryClient>,
    pub resolver: Arc<RecipientResolver>,
    pub normalizer: Arc<SpeakerNormalizer>,
    /// Absent when no SMTP host is configured; summaries are then
    /// computed but not delivered.
    pub mailer: Option<Arc<dyn Mailer>>,
}

pub struct ApiServer {
    host: String,
    port: u16,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: &Config, state: AppState) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            state,
        }
    }

    /// Compose the full application router. Split out so tests can drive
    /// it without binding a socket.
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/", get(status))
            .route("/version", get(version))
            .merge(routes::chunks::router(state.clone()))
            .merge(routes::finalize::router(state.clone()))
            .merge(routes::diagnostics::router(state.clone()))
            .merge(routes::mail::router(state))
    }

    pub async fn start(self) -> Result<()> {
        let app = Self::router(self.state);

        let listener =
            tokio::net::TcpListener::bind(&format!("{}:{}", self.host, self.port)).await?;

        info!("API server listening on http://{}:{}", self.host, self.port);
        info!("Endpoints:");
        info!("  POST /chunks             - Ingest and transcribe an audio chunk");
        info!("  POST /finalize           - Aggregate, summarize and deliver");
        info!("  GET  /transcripts/:room  - List transcript files for a room");
        info!("  POST /test-email         - Send a test summary email");
        info!("  GET  /                   - Service info");
        info!("  GET  /version            - Version info");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "minuta",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "minuta"
    }))
}
