//! Summary delivery: recipient resolution and per-address sending.
//!
//! Recipients come from a strategy chain, stopping at the first tier that
//! yields at least one address: the caller's explicit address, then the
//! meeting registry's participant list, then addresses pattern-extracted
//! from the transcript itself. Delivery to each address is independent;
//! transcript cleanup is allowed only when every attempted send succeeded.

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::mail::Mailer;

/// Queries the external meeting registry for a room's participant emails.
pub struct RegistryClient {
    client: reqwest::Client,
    endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParticipantEntry {
    Address(String),
    Object { email: String },
}

#[derive(Debug, Deserialize)]
struct RegistryResponse {
    participants: Vec<ParticipantEntry>,
}

impl RegistryClient {
    pub fn new(config: &RegistryConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Participant emails for a room, or `None` when no registry is
    /// configured or the lookup produced nothing usable. Registry errors
    /// degrade to `None` so the next resolution tier can run.
    pub async fn participants(&self, room: &str) -> Option<Vec<String>> {
        let endpoint = self.endpoint.as_deref()?;
        let url = format!("{}/{}", endpoint.trim_end_matches('/'), room);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Meeting registry lookup failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(
                "Meeting registry returned status {} for room {}",
                response.status(),
                room
            );
            return None;
        }

        let body = response.text().await.ok()?;
        let emails = parse_participants(&body);
        if emails.is_empty() {
            debug!("Meeting registry had no participants for room {}", room);
            None
        } else {
            Some(emails)
        }
    }
}

/// Accepts both registry shapes seen in the wild: a `participants` array
/// of bare addresses, or of objects with an `email` field.
pub fn parse_participants(body: &str) -> Vec<String> {
    let parsed: Result<RegistryResponse, _> = serde_json::from_str(body);
    match parsed {
        Ok(response) => response
            .participants
            .into_iter()
            .map(|entry| match entry {
                ParticipantEntry::Address(address) => address,
                ParticipantEntry::Object { email } => email,
            })
            .filter(|address| !address.trim().is_empty())
            .collect(),
        Err(_) => Vec::new(),
    }
}

pub struct RecipientResolver {
    email_pattern: Regex,
}

impl RecipientResolver {
    pub fn new() -> Result<Self> {
        Ok(Self {
            email_pattern: Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}")?,
        })
    }

    /// The caller's explicit address as a single-recipient list, when
    /// usable. Exposed on its own so callers can decide whether the
    /// registry lookup needs to run at all.
    pub fn explicit_recipient(explicit: Option<&str>) -> Option<Vec<String>> {
        explicit
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(|address| vec![address.to_string()])
    }

    /// Tiered resolution: explicit address, registry participants,
    /// transcript extraction. First tier with at least one address wins;
    /// an empty result means "computed but not delivered", a terminal
    /// success state.
    pub fn resolve(
        &self,
        explicit: Option<&str>,
        registry: Option<Vec<String>>,
        transcript: &str,
    ) -> Vec<String> {
        let tiers: [&dyn Fn() -> Option<Vec<String>>; 3] = [
            &|| Self::explicit_recipient(explicit),
            &|| registry.clone().filter(|emails| !emails.is_empty()),
            &|| {
                let extracted = self.extract_emails(transcript);
                if extracted.is_empty() {
                    None
                } else {
                    Some(extracted)
                }
            },
        ];

        tiers
            .iter()
            .find_map(|tier| tier())
            .unwrap_or_default()
    }

    /// RFC-plausible addresses found in the transcript, deduplicated in
    /// first-seen order.
    pub fn extract_emails(&self, text: &str) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        let mut emails = Vec::new();
        for m in self.email_pattern.find_iter(text) {
            let address = m.as_str().to_string();
            if seen.insert(address.clone()) {
                emails.push(address);
            }
        }
        emails
    }
}

/// Per-address outcome of a delivery round.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    /// Transcript files may be removed only when at least one delivery
    /// was attempted and none failed.
    pub fn allows_cleanup(&self) -> bool {
        self.attempted() > 0 && self.failed.is_empty()
    }
}

/// Send the summary to every recipient independently; one address failing
/// never blocks the others.
pub async fn deliver_summary(
    mailer: &dyn Mailer,
    recipients: &[String],
    subject: &str,
    html_body: &str,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for recipient in recipients {
        match mailer.send(recipient, subject, html_body).await {
            Ok(()) => {
                info!("Summary delivered to {}", recipient);
                report.delivered.push(recipient.clone());
            }
            Err(e) => {
                warn!("Summary delivery to {} failed: {:#}", recipient, e);
                report.failed.push(recipient.clone());
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::FakeMailer;

    fn resolver() -> RecipientResolver {
        RecipientResolver::new().unwrap()
    }

    #[test]
    fn explicit_address_wins_over_everything() {
        let recipients = resolver().resolve(
            Some("a@b.com"),
            Some(vec!["reg@x.com".to_string()]),
            "contact me at x@y.com",
        );
        assert_eq!(recipients, vec!["a@b.com"]);
    }

    #[test]
    fn explicit_tier_is_computable_on_its_own() {
        assert_eq!(
            RecipientResolver::explicit_recipient(Some(" a@b.com ")),
            Some(vec!["a@b.com".to_string()])
        );
        assert_eq!(RecipientResolver::explicit_recipient(Some("   ")), None);
        assert_eq!(RecipientResolver::explicit_recipient(None), None);
    }

    #[test]
    fn registry_wins_over_extraction() {
        let recipients = resolver().resolve(
            None,
            Some(vec!["reg@x.com".to_string()]),
            "contact me at x@y.com",
        );
        assert_eq!(recipients, vec!["reg@x.com"]);
    }

    #[test]
    fn extraction_is_the_last_tier() {
        let recipients = resolver().resolve(None, None, "contact me at x@y.com");
        assert_eq!(recipients, vec!["x@y.com"]);
    }

    #[test]
    fn no_tier_yields_empty_result() {
        let recipients = resolver().resolve(None, None, "sin correos aquí");
        assert!(recipients.is_empty());
    }

    #[test]
    fn blank_explicit_address_falls_through() {
        let recipients = resolver().resolve(Some("   "), None, "contact me at x@y.com");
        assert_eq!(recipients, vec!["x@y.com"]);
    }

    #[test]
    fn extracted_addresses_are_deduplicated_in_order() {
        let emails = resolver().extract_emails("a@b.com then c@d.org then a@b.com again");
        assert_eq!(emails, vec!["a@b.com", "c@d.org"]);
    }

    #[test]
    fn registry_shapes_both_parse() {
        let flat = r#"{"participants":["a@b.com","c@d.org"]}"#;
        assert_eq!(parse_participants(flat), vec!["a@b.com", "c@d.org"]);

        let nested = r#"{"participants":[{"email":"a@b.com"}]}"#;
        assert_eq!(parse_participants(nested), vec!["a@b.com"]);

        assert!(parse_participants("not json").is_empty());
    }

    #[tokio::test]
    async fn one_failure_does_not_block_other_recipients() {
        let mailer = FakeMailer::failing_for(&["mala@x.com"]);
        let recipients = vec![
            "a@x.com".to_string(),
            "mala@x.com".to_string(),
            "b@x.com".to_string(),
        ];

        let report = deliver_summary(&mailer, &recipients, "acta", "<p>resumen</p>").await;

        assert_eq!(report.delivered, vec!["a@x.com", "b@x.com"]);
        assert_eq!(report.failed, vec!["mala@x.com"]);
        assert!(!report.allows_cleanup());
    }

    #[tokio::test]
    async fn cleanup_requires_all_deliveries_to_succeed() {
        let mailer = FakeMailer::new();
        let recipients = vec!["a@x.com".to_string(), "b@x.com".to_string()];
        let report = deliver_summary(&mailer, &recipients, "acta", "<p>resumen</p>").await;
        assert!(report.allows_cleanup());

        let empty = deliver_summary(&mailer, &[], "acta", "<p>resumen</p>").await;
        assert!(!empty.allows_cleanup());
    }
}
