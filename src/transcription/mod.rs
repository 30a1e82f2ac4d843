//! Speech-to-text client.
//!
//! Uploads an audio chunk as a multipart form to the configured provider
//! and applies the bounded recovery protocol: when the provider rejects
//! the chunk with its unprocessable-media signal and no conversion has
//! been attempted yet for this call, the original input is transcoded to
//! WAV and the upload is retried exactly once. Every other failure, and a
//! failed second attempt, surfaces as an upstream error carrying the
//! provider's status and body.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::TranscriptionConfig;
use crate::transcode::{cleanup_temp_file, Transcoder};

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("No speech-to-text API key configured")]
    Config,
    #[error("Speech-to-text provider failed{}: {detail}", status_suffix(.status))]
    Upstream { status: Option<u16>, detail: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" with status {}", code),
        None => String::new(),
    }
}

/// Outcome of a transcription call, with diagnostic flags for the caller.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub retried: bool,
    pub transcoded: bool,
}

enum SubmitFailure {
    /// Provider answered with a non-success status.
    Http { status: u16, body: String },
    /// The request never produced a response.
    Transport(String),
}

impl SubmitFailure {
    fn into_upstream(self) -> TranscribeError {
        match self {
            SubmitFailure::Http { status, body } => TranscribeError::Upstream {
                status: Some(status),
                detail: body,
            },
            SubmitFailure::Transport(detail) => TranscribeError::Upstream {
                status: None,
                detail,
            },
        }
    }
}

pub struct SpeechClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    pre_transcode: bool,
    transcoder: Transcoder,
}

impl SpeechClient {
    pub fn new(config: &TranscriptionConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.resolved_api_key(),
            pre_transcode: config.pre_transcode,
            transcoder: Transcoder::new(config.transcode_timeout_seconds),
        })
    }

    pub async fn transcribe(&self, path: &Path) -> Result<Transcription, TranscribeError> {
        let api_key = self.api_key.as_deref().ok_or(TranscribeError::Config)?;

        let mut transcode_attempted = false;
        let mut transcoded = false;
        let mut retried = false;
        let mut temp_wav: Option<PathBuf> = None;

        if self.pre_transcode && Transcoder::wants_pre_transcode(path) {
            transcode_attempted = true;
            match self.transcoder.to_wav(path).await {
                Ok(wav) => {
                    transcoded = true;
                    temp_wav = Some(wav);
                }
                Err(e) => {
                    warn!("Pre-transcode failed, uploading original chunk: {:#}", e);
                }
            }
        }

        let upload_path = temp_wav.as_deref().unwrap_or(path);
        let mut outcome = self.submit(upload_path, api_key).await;

        let retry_status = match &outcome {
            Err(SubmitFailure::Http { status, body }) if should_retry(body, transcode_attempted) => {
                Some(*status)
            }
            _ => None,
        };

        if let Some(status) = retry_status {
            info!(
                "Provider reported unprocessable media (status {}), converting and retrying once",
                status
            );
            retried = true;

            // Retry always converts the original input, not a prior temp
            // artifact.
            match self.transcoder.to_wav(path).await {
                Ok(wav) => {
                    transcoded = true;
                    outcome = self.submit(&wav, api_key).await;
                    if let Some(old) = temp_wav.replace(wav) {
                        cleanup_temp_file(&old);
                    }
                }
                Err(e) => {
                    if let Some(wav) = &temp_wav {
                        cleanup_temp_file(wav);
                    }
                    return Err(TranscribeError::Upstream {
                        status: Some(status),
                        detail: format!(
                            "unprocessable media and transcode fallback failed: {:#}",
                            e
                        ),
                    });
                }
            }
        }

        if let Some(wav) = &temp_wav {
            cleanup_temp_file(wav);
        }

        match outcome {
            Ok(text) => {
                info!(
                    chars = text.len(),
                    retried, transcoded, "Transcription complete"
                );
                Ok(Transcription {
                    text,
                    retried,
                    transcoded,
                })
            }
            Err(failure) => Err(failure.into_upstream()),
        }
    }

    async fn submit(&self, path: &Path, api_key: &str) -> Result<String, SubmitFailure> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SubmitFailure::Transport(format!("Failed to read {:?}: {}", path, e)))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("chunk.wav")
            .to_string();
        let file_part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_for(path))
            .map_err(|e| SubmitFailure::Transport(format!("Invalid mime type: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", file_part);

        debug!(model = %self.model, "Uploading audio chunk to speech-to-text provider");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SubmitFailure::Transport(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SubmitFailure::Transport(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            warn!(
                "Speech-to-text request failed with status {}: {}",
                status, body
            );
            return Err(SubmitFailure::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(extract_transcript_text(&body))
    }
}

/// Phrases the provider uses to signal media it could not decode. Only
/// this signal is recoverable by a transcode-and-retry.
const UNPROCESSABLE_MEDIA_SIGNALS: &[&str] = &[
    "could not process file",
    "invalid file format",
    "unsupported media",
];

pub fn is_unprocessable_media(body: &str) -> bool {
    let lower = body.to_lowercase();
    UNPROCESSABLE_MEDIA_SIGNALS
        .iter()
        .any(|signal| lower.contains(signal))
}

/// Retry budget is one transcode per call, total: the signal must match
/// and no transcode may have been attempted yet, whatever its outcome.
pub fn should_retry(body: &str, transcode_attempted: bool) -> bool {
    !transcode_attempted && is_unprocessable_media(body)
}

/// Pull the transcript out of the provider's response, which has varied
/// between shapes across versions: `text`, `results[0].text`,
/// `transcript`, or no known field at all (returned whole).
pub fn extract_transcript_text(body: &str) -> String {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return body.trim().to_string(),
    };

    let candidates = [
        value.get("text"),
        value
            .get("results")
            .and_then(|r| r.get(0))
            .and_then(|r| r.get("text")),
        value.get("transcript"),
    ];

    for candidate in candidates.into_iter().flatten() {
        if let Some(text) = candidate.as_str() {
            let text = text.trim();
            if !text.is_empty() {
                return text.to_string();
            }
        }
    }

    value.to_string()
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("wav") => "audio/wav",
        Some("webm") => "audio/webm",
        Some("ogg") | Some("opus") => "audio/ogg",
        Some("mp3") => "audio/mpeg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        _ => "application/octet-stream",
    }
}
