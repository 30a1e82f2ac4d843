//! Transcript storage.
//!
//! Transcript lines are appended to one file per `(room, owner)` pair,
//! named `transcript-{room}-{owner}.txt`, under an ordered list of storage
//! roots. Aggregation searches the roots in priority order and stops at
//! the first root containing at least one match. The trait exists so the
//! pipeline can be exercised against an in-memory fake.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;

/// Concatenated transcript content for a room, plus the identifiers of
/// the files that produced it (used later for conditional deletion).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub text: String,
    pub files: Vec<String>,
}

impl Aggregate {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Diagnostics entry for one transcript file.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TranscriptFileInfo {
    pub path: String,
    pub root: String,
    pub lines: usize,
    pub preview: Vec<String>,
}

#[async_trait]
pub trait TranscriptStorage: Send + Sync {
    /// Append one timestamped, attributed line. Creates the directory and
    /// file on first use; never truncates.
    async fn append(&self, room: &str, owner: &str, speaker: &str, text: &str) -> Result<()>;

    /// Collect transcript content for a room. With an owner, only that
    /// owner's file is considered; otherwise every file for the room. The
    /// first storage root yielding a match wins; later roots are not
    /// consulted. No match is an empty result, not an error.
    async fn aggregate(&self, room: &str, owner: Option<&str>) -> Result<Aggregate>;

    /// Best-effort removal of the given files. Failures are logged and
    /// swallowed; deletion is advisory cleanup.
    async fn delete(&self, files: &[String]);

    /// Operator diagnostics: every file for the room across ALL roots,
    /// with a short line preview.
    async fn list(&self, room: &str) -> Result<Vec<TranscriptFileInfo>>;
}

/// File name for a `(room, owner)` transcript.
pub fn transcript_file_name(room: &str, owner: &str) -> String {
    format!(
        "transcript-{}-{}.txt",
        sanitize_key(room),
        sanitize_key(owner)
    )
}

/// File name prefix matching every owner's transcript for a room.
pub fn transcript_room_prefix(room: &str) -> String {
    format!("transcript-{}-", sanitize_key(room))
}

/// Room and user identifiers come straight from clients; anything that
/// could escape the storage root is replaced before it reaches a path.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Render one transcript line as stored on disk.
pub fn format_line(speaker: &str, text: &str) -> String {
    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    format!("[{}] {}: {}\n", timestamp, speaker, text.trim())
}

/// Header inserted before each file's content in an aggregate.
pub fn file_header(file_name: &str, root: &str) -> String {
    format!("===== {} (root: {}) =====\n", file_name, root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_blocks_path_traversal() {
        assert_eq!(sanitize_key("../etc"), "___etc");
        assert_eq!(sanitize_key("sala/uno"), "sala_uno");
        assert_eq!(sanitize_key("sala-1_b"), "sala-1_b");
    }

    #[test]
    fn file_name_embeds_room_and_owner() {
        assert_eq!(
            transcript_file_name("sala1", "ana"),
            "transcript-sala1-ana.txt"
        );
        assert_eq!(transcript_room_prefix("sala1"), "transcript-sala1-");
    }

    #[test]
    fn formatted_line_is_timestamped_and_attributed() {
        let line = format_line("user42", "  hola  ");
        assert!(line.starts_with('['));
        assert!(line.ends_with("user42: hola\n"));
    }
}
