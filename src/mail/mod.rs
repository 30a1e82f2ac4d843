//! Email delivery.
//!
//! The summary is sent as an HTML email over SMTP. The [`Mailer`] trait is
//! the seam the delivery logic is tested through; [`FakeMailer`] records
//! sends and can be told to fail specific recipients.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::collections::BTreeSet;
use tracing::info;

use crate::config::MailConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let host = config
            .smtp_host
            .as_deref()
            .context("No SMTP host configured")?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .with_context(|| format!("Invalid SMTP host {}", host))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = config
            .from
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid from address {}", config.from))?;

        info!("SMTP mailer configured for {}:{}", host, config.smtp_port);

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to
                .parse::<Mailbox>()
                .with_context(|| format!("Invalid recipient address {}", to))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .context("Failed to build email message")?;

        self.transport
            .send(message)
            .await
            .with_context(|| format!("Failed to send email to {}", to))?;

        info!("Email sent to {}", to);
        Ok(())
    }
}

/// Render the summary email body. Plain format! templating; the mail
/// provider only needs a self-contained HTML fragment.
pub fn render_summary_email(room: &str, participants: &BTreeSet<String>, summary: &str) -> String {
    let participant_items = if participants.is_empty() {
        "<li>(sin participantes detectados)</li>".to_string()
    } else {
        participants
            .iter()
            .map(|name| format!("<li>{}</li>", html_escape(name)))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let summary_html = html_escape(summary).replace('\n', "<br>\n");

    format!(
        "<html><body>\n\
         <h2>Resumen de la reunión {room}</h2>\n\
         <h3>Participantes</h3>\n\
         <ul>\n{participants}\n</ul>\n\
         <h3>Resumen</h3>\n\
         <p>{summary}</p>\n\
         </body></html>",
        room = html_escape(room),
        participants = participant_items,
        summary = summary_html,
    )
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Test double recording every send and failing the configured addresses.
#[derive(Default)]
pub struct FakeMailer {
    pub fail_for: BTreeSet<String>,
    pub sent: tokio::sync::Mutex<Vec<(String, String)>>,
}

impl FakeMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(addresses: &[&str]) -> Self {
        Self {
            fail_for: addresses.iter().map(|a| a.to_string()).collect(),
            sent: tokio::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> Result<()> {
        if self.fail_for.contains(to) {
            return Err(anyhow!("simulated delivery failure for {}", to));
        }
        self.sent
            .lock()
            .await
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_email_escapes_html_and_lists_participants() {
        let mut participants = BTreeSet::new();
        participants.insert("Ana <jefa>".to_string());

        let html = render_summary_email("sala1", &participants, "1 < 2\nfin");
        assert!(html.contains("<li>Ana &lt;jefa&gt;</li>"));
        assert!(html.contains("1 &lt; 2<br>"));
        assert!(html.contains("sala1"));
    }

    #[tokio::test]
    async fn fake_mailer_fails_only_configured_addresses() {
        let mailer = FakeMailer::failing_for(&["mala@x.com"]);
        assert!(mailer.send("buena@x.com", "hola", "<p>x</p>").await.is_ok());
        assert!(mailer.send("mala@x.com", "hola", "<p>x</p>").await.is_err());
        assert_eq!(mailer.sent.lock().await.len(), 1);
    }
}
