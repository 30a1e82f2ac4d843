//! Audio transcoding for transcription uploads.
//!
//! The speech-to-text provider occasionally rejects browser-captured
//! containers (webm/ogg/opus). FFmpeg converts those chunks to a mono
//! 16 kHz WAV the provider always accepts.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Container extensions that benefit from a pre-upload conversion.
const PRE_TRANSCODE_EXTENSIONS: &[&str] = &["webm", "ogg", "opus"];

#[derive(Debug, Clone)]
pub struct Transcoder {
    timeout: Duration,
}

impl Transcoder {
    pub fn new(timeout_seconds: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    /// Check if FFmpeg is available on the system.
    pub fn is_available() -> bool {
        std::process::Command::new("ffmpeg")
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Whether the input's extension marks it for optional pre-transcoding.
    pub fn wants_pre_transcode(input: &Path) -> bool {
        input
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| PRE_TRANSCODE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// Convert an audio chunk to mono 16 kHz WAV in the temp dir.
    ///
    /// Returns the path of the converted temp file. The subprocess is
    /// killed if it exceeds the configured timeout.
    pub async fn to_wav(&self, input: &Path) -> Result<PathBuf> {
        if !Self::is_available() {
            bail!("FFmpeg is required to convert audio chunks but was not found");
        }

        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("chunk");
        let output = std::env::temp_dir().join(format!("{}_converted.wav", stem));

        debug!("Transcoding {:?} -> {:?}", input, output);

        // -vn: audio only, -ac 1: mono, -ar 16000: 16 kHz sample rate
        let input_arg = input
            .to_str()
            .with_context(|| format!("Non-UTF8 input path: {:?}", input))?;
        let run = tokio::process::Command::new("ffmpeg")
            .args(["-i", input_arg])
            .args(["-vn"])
            .args(["-ac", "1"])
            .args(["-ar", "16000"])
            .args(["-y"])
            .arg(&output)
            .output();

        let result = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result.context("Failed to run FFmpeg")?,
            Err(_) => {
                cleanup_temp_file(&output);
                bail!(
                    "FFmpeg timed out after {}s converting {:?}",
                    self.timeout.as_secs(),
                    input
                );
            }
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            cleanup_temp_file(&output);
            bail!("FFmpeg conversion failed: {}", stderr);
        }

        if !output.exists() {
            bail!("FFmpeg did not produce output file");
        }

        Ok(output)
    }
}

/// Remove a temporary converted file. Best-effort; failures are logged.
pub fn cleanup_temp_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if path.exists() {
            warn!("Failed to remove temp file {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_containers_want_pre_transcode() {
        assert!(Transcoder::wants_pre_transcode(Path::new("/tmp/a.webm")));
        assert!(Transcoder::wants_pre_transcode(Path::new("/tmp/a.OGG")));
        assert!(Transcoder::wants_pre_transcode(Path::new("/tmp/a.opus")));
        assert!(!Transcoder::wants_pre_transcode(Path::new("/tmp/a.wav")));
        assert!(!Transcoder::wants_pre_transcode(Path::new("/tmp/noext")));
    }

    #[test]
    fn cleanup_missing_file_does_not_panic() {
        cleanup_temp_file(Path::new("/nonexistent/minuta-test.wav"));
    }

    #[tokio::test]
    async fn to_wav_fails_cleanly_on_bad_input() {
        if !Transcoder::is_available() {
            eprintln!("Skipping: FFmpeg not installed");
            return;
        }
        let transcoder = Transcoder::new(30);
        let result = transcoder.to_wav(Path::new("/nonexistent/input.webm")).await;
        assert!(result.is_err());
    }
}
