use crate::api::{ApiServer, AppState};
use crate::config::Config;
use crate::delivery::{RecipientResolver, RegistryClient};
use crate::mail::{Mailer, SmtpMailer};
use crate::normalizer::SpeakerNormalizer;
use crate::store::FsStore;
use crate::summary::SummaryClient;
use crate::transcode::Transcoder;
use crate::transcription::SpeechClient;
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run_service() -> Result<()> {
    info!("Starting Minuta service");

    let config = Config::load()?;
    let state = build_state(&config)?;

    if !Transcoder::is_available() {
        warn!("FFmpeg not found; transcode-and-retry recovery will be unavailable");
    }

    let api_server = ApiServer::new(&config, state);

    info!("Minuta is ready");
    api_server.start().await
}

pub fn build_state(config: &Config) -> Result<AppState> {
    let roots = config.storage.resolved_roots()?;
    info!("Transcript storage roots (in priority order): {:?}", roots);

    let mailer: Option<Arc<dyn Mailer>> = match &config.mail.smtp_host {
        Some(_) => Some(Arc::new(SmtpMailer::new(&config.mail)?)),
        None => {
            warn!("No SMTP host configured; summaries will not be emailed");
            None
        }
    };

    Ok(AppState {
        store: Arc::new(FsStore::new(roots)),
        speech: Arc::new(SpeechClient::new(&config.transcription)?),
        summarizer: Arc::new(SummaryClient::new(&config.summary)?),
        registry: Arc::new(RegistryClient::new(&config.registry)?),
        resolver: Arc::new(RecipientResolver::new()?),
        normalizer: Arc::new(SpeakerNormalizer::new()?),
        mailer,
    })
}
