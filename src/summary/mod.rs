//! AI summary generation.
//!
//! Sends the normalized transcript to a chat-completion provider with a
//! fixed system instruction. Provider failures never abort finalize: the
//! caller gets an extractive fallback (the first transcript lines) plus
//! the provider status code for observability.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::SummaryConfig;

/// System instruction pinned for every summary request: no invented
/// speakers, answer in the transcript's language, exactly three sections.
const SYSTEM_PROMPT: &str = "Eres un asistente que redacta actas de reuniones. \
Nunca inventes hablantes que no aparezcan en la transcripción. \
Responde siempre en el idioma de la transcripción. \
Produce exactamente tres secciones tituladas: Resumen, Acuerdos, Pendientes.";

/// Lines of raw transcript used when the provider is unavailable.
const FALLBACK_LINES: usize = 12;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Summary text plus the provider status observed while producing it.
/// `provider_status` is 0 when no request was made.
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    pub text: String,
    pub provider_status: u16,
    pub fallback: bool,
}

pub struct SummaryClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl SummaryClient {
    pub fn new(config: &SummaryConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.resolved_api_key(),
        })
    }

    /// Generate a structured summary. Degrades to an extractive fallback
    /// on any provider problem; the finalize flow never fails here.
    pub async fn summarize(
        &self,
        participants: &BTreeSet<String>,
        transcript: &str,
    ) -> SummaryOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("No summary API key configured, using extractive fallback");
            return SummaryOutcome {
                text: extractive_summary(transcript),
                provider_status: 0,
                fallback: true,
            };
        };

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_user_message(participants, transcript),
                },
            ],
        };

        let response = match self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Summary request failed, using extractive fallback: {}", e);
                return SummaryOutcome {
                    text: extractive_summary(transcript),
                    provider_status: 0,
                    fallback: true,
                };
            }
        };

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if !(200..300).contains(&status) {
            warn!(
                "Summary provider returned status {}, using extractive fallback: {}",
                status, body
            );
            return SummaryOutcome {
                text: extractive_summary(transcript),
                provider_status: status,
                fallback: true,
            };
        }

        match serde_json::from_str::<ChatResponse>(&body) {
            Ok(parsed) if !parsed.choices.is_empty() => {
                let text = parsed.choices[0].message.content.trim().to_string();
                info!(chars = text.len(), status, "Summary generated");
                SummaryOutcome {
                    text,
                    provider_status: status,
                    fallback: false,
                }
            }
            _ => {
                warn!("Unparseable summary response, using extractive fallback");
                SummaryOutcome {
                    text: extractive_summary(transcript),
                    provider_status: status,
                    fallback: true,
                }
            }
        }
    }
}

/// User message embedding the detected participants and the normalized
/// transcript.
pub fn build_user_message(participants: &BTreeSet<String>, transcript: &str) -> String {
    let names = if participants.is_empty() {
        "(ninguno detectado)".to_string()
    } else {
        participants
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "Participantes detectados: {}\n\nTranscripción:\n{}",
        names, transcript
    )
}

/// First lines of the raw transcript, used when no AI summary could be
/// produced.
pub fn extractive_summary(transcript: &str) -> String {
    transcript
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(FALLBACK_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_embeds_participants_and_transcript() {
        let mut participants = BTreeSet::new();
        participants.insert("Ana".to_string());
        participants.insert("Luis".to_string());

        let message = build_user_message(&participants, "Ana: hola");
        assert!(message.contains("Ana, Luis"));
        assert!(message.contains("Ana: hola"));
    }

    #[test]
    fn user_message_handles_empty_participant_set() {
        let message = build_user_message(&BTreeSet::new(), "hola");
        assert!(message.contains("(ninguno detectado)"));
    }

    #[test]
    fn extractive_fallback_takes_leading_lines_only() {
        let transcript = (0..30)
            .map(|i| format!("línea {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let fallback = extractive_summary(&transcript);
        assert!(fallback.contains("línea 0"));
        assert!(fallback.contains("línea 11"));
        assert!(!fallback.contains("línea 12"));
    }

    #[tokio::test]
    async fn missing_api_key_degrades_to_fallback() {
        std::env::remove_var("MINUTA_SUMMARY_API_KEY");
        let client = SummaryClient::new(&SummaryConfig {
            api_key: None,
            ..Default::default()
        })
        .unwrap();

        let outcome = client.summarize(&BTreeSet::new(), "Ana: hola\nLuis: adiós").await;
        assert!(outcome.fallback);
        assert_eq!(outcome.provider_status, 0);
        assert!(outcome.text.contains("Ana: hola"));
    }
}
