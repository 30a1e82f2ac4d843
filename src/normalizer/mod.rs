//! Transcript normalization and participant extraction.
//!
//! Raw aggregated transcripts contain a mix of attributed lines
//! (`Ana: hola`), chat-marker prefixed lines (`(chat) Ana: hola`), file
//! boundary headers inserted by aggregation, and free-form speech. The
//! normalizer rewrites every line to `Name: message` form, collects the
//! distinct speaker names, and tags everything it cannot attribute as
//! `[Unknown]`. Pure text transform, no I/O.

use anyhow::Result;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::warn;

/// Label applied to lines that could not be attributed to a speaker.
pub const UNKNOWN_SPEAKER: &str = "[Unknown]";

/// Result of normalizing an aggregated transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub participants: BTreeSet<String>,
}

pub struct SpeakerNormalizer {
    /// `(marker)? Name: message` with colon or fullwidth colon, or
    /// `Name - message` with a spaced hyphen separator.
    attributed: Regex,
    /// Looser pattern for chat-marker lines: the name follows the marker
    /// and the separator may be an unspaced hyphen.
    chat_marked: Regex,
    /// Leading `[timestamp]` bracket added by the transcript store.
    timestamp: Regex,
    /// File boundary header inserted by aggregation; passes through as-is.
    header: Regex,
}

impl SpeakerNormalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            attributed: Regex::new(
                r"^(?:\([^)]{1,40}\)\s*)?(?:([\w][\w .\-]{0,58}?)\s*[:：]|([\w][\w .]{0,58}?)\s+-)\s*(\S.*)$",
            )?,
            chat_marked: Regex::new(r"^\([^)]{1,40}\)\s*([\w][\w .]{0,58}?)\s*[-:：]\s*(\S.*)$")?,
            timestamp: Regex::new(r"^\[[^\]]*\]\s*")?,
            header: Regex::new(r"^={3,}")?,
        })
    }

    /// Normalize a raw aggregated transcript. Best-effort: malformed input
    /// falls back to the raw text with an empty participant set rather
    /// than failing the caller.
    pub fn normalize(&self, raw: &str) -> Normalized {
        match self.try_normalize(raw) {
            Some(normalized) => normalized,
            None => {
                warn!("Transcript normalization fell back to raw text");
                Normalized {
                    text: raw.to_string(),
                    participants: BTreeSet::new(),
                }
            }
        }
    }

    fn try_normalize(&self, raw: &str) -> Option<Normalized> {
        let mut participants = BTreeSet::new();
        let mut lines = Vec::new();

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if self.header.is_match(line) {
                lines.push(line.to_string());
                continue;
            }

            let stripped = self.timestamp.replace(line, "");

            if let Some(caps) = self.attributed.captures(&stripped) {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))?
                    .as_str()
                    .trim()
                    .to_string();
                let message = caps.get(3)?.as_str().trim();
                lines.push(format!("{}: {}", name, message));
                participants.insert(name);
                continue;
            }

            if let Some(caps) = self.chat_marked.captures(&stripped) {
                let name = caps.get(1)?.as_str().trim().to_string();
                let message = caps.get(2)?.as_str().trim();
                lines.push(format!("{}: {}", name, message));
                participants.insert(name);
                continue;
            }

            lines.push(format!("{}: {}", UNKNOWN_SPEAKER, stripped));
        }

        Some(Normalized {
            text: lines.join("\n"),
            participants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(input: &str) -> Normalized {
        SpeakerNormalizer::new().unwrap().normalize(input)
    }

    #[test]
    fn chat_marked_line_yields_participant_and_clean_line() {
        let result = normalize("(chat) Ana: hola a todos");
        assert_eq!(result.text, "Ana: hola a todos");
        assert!(result.participants.contains("Ana"));
        assert_eq!(result.participants.len(), 1);
    }

    #[test]
    fn unattributed_line_is_marked_unknown() {
        let result = normalize("buenas tardes");
        assert_eq!(result.text, "[Unknown]: buenas tardes");
        assert!(result.participants.is_empty());
    }

    #[test]
    fn timestamp_prefix_is_stripped_before_matching() {
        let result = normalize("[2026-08-26T10:00:00Z] user42: arrancamos");
        assert_eq!(result.text, "user42: arrancamos");
        assert!(result.participants.contains("user42"));
    }

    #[test]
    fn fullwidth_colon_separator_is_accepted() {
        let result = normalize("María López： buenos días");
        assert_eq!(result.text, "María López: buenos días");
        assert!(result.participants.contains("María López"));
    }

    #[test]
    fn spaced_hyphen_separator_is_accepted() {
        let result = normalize("Pedro - de acuerdo");
        assert_eq!(result.text, "Pedro: de acuerdo");
        assert!(result.participants.contains("Pedro"));
    }

    #[test]
    fn header_lines_pass_through_unchanged() {
        let header = "===== transcript-sala1-ana.txt (root: /tmp/roots) =====";
        let result = normalize(header);
        assert_eq!(result.text, header);
        assert!(result.participants.is_empty());
    }

    #[test]
    fn participants_are_deduplicated() {
        let result = normalize("Ana: hola\nAna: sigo yo\nLuis: hola");
        assert_eq!(
            result.participants.iter().collect::<Vec<_>>(),
            vec!["Ana", "Luis"]
        );
    }

    #[test]
    fn overlong_name_is_not_treated_as_speaker() {
        let name = "a".repeat(80);
        let result = normalize(&format!("{}: hola", name));
        assert!(result.participants.is_empty());
        assert!(result.text.starts_with(UNKNOWN_SPEAKER));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let result = normalize("\n\n  \n");
        assert_eq!(result.text, "");
        assert!(result.participants.is_empty());
    }
}
