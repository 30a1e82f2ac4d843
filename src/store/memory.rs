//! In-memory transcript store.
//!
//! Drop-in fake for [`TranscriptStorage`] so the finalize pipeline can be
//! tested without touching the filesystem.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::{
    file_header, format_line, transcript_file_name, Aggregate, TranscriptFileInfo,
    TranscriptStorage,
};

const MEMORY_ROOT: &str = "memory";

#[derive(Default)]
pub struct MemoryStore {
    /// Keyed by file name, mirroring the on-disk layout of a single root.
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, room: &str, owner: &str) -> bool {
        self.files
            .lock()
            .await
            .contains_key(&transcript_file_name(room, owner))
    }

    pub async fn file_count(&self) -> usize {
        self.files.lock().await.len()
    }
}

#[async_trait]
impl TranscriptStorage for MemoryStore {
    async fn append(&self, room: &str, owner: &str, speaker: &str, text: &str) -> Result<()> {
        let mut files = self.files.lock().await;
        files
            .entry(transcript_file_name(room, owner))
            .or_default()
            .push_str(&format_line(speaker, text));
        Ok(())
    }

    async fn aggregate(&self, room: &str, owner: Option<&str>) -> Result<Aggregate> {
        let files = self.files.lock().await;
        let mut text = String::new();
        let mut matched = Vec::new();

        for (name, content) in files.iter() {
            let is_match = match owner {
                Some(owner) => *name == transcript_file_name(room, owner),
                None => name.starts_with(&super::transcript_room_prefix(room)),
            };
            if is_match {
                text.push_str(&file_header(name, MEMORY_ROOT));
                text.push_str(content);
                matched.push(name.clone());
            }
        }

        Ok(Aggregate {
            text,
            files: matched,
        })
    }

    async fn delete(&self, names: &[String]) {
        let mut files = self.files.lock().await;
        for name in names {
            files.remove(name);
        }
    }

    async fn list(&self, room: &str) -> Result<Vec<TranscriptFileInfo>> {
        let files = self.files.lock().await;
        Ok(files
            .iter()
            .filter(|(name, _)| name.starts_with(&super::transcript_room_prefix(room)))
            .map(|(name, content)| TranscriptFileInfo {
                path: name.clone(),
                root: MEMORY_ROOT.to_string(),
                lines: content.lines().count(),
                preview: content.lines().take(3).map(|l| l.to_string()).collect(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn behaves_like_a_single_root_store() {
        let store = MemoryStore::new();
        store.append("sala1", "ana", "ana", "hola").await.unwrap();
        store.append("sala1", "luis", "luis", "buenas").await.unwrap();

        let aggregate = store.aggregate("sala1", None).await.unwrap();
        assert_eq!(aggregate.files.len(), 2);
        assert!(aggregate.text.contains("ana: hola"));

        store.delete(&aggregate.files).await;
        assert_eq!(store.file_count().await, 0);
    }

    #[tokio::test]
    async fn owner_filter_selects_one_file() {
        let store = MemoryStore::new();
        store.append("sala1", "ana", "ana", "hola").await.unwrap();
        store.append("sala1", "luis", "luis", "buenas").await.unwrap();

        let aggregate = store.aggregate("sala1", Some("ana")).await.unwrap();
        assert_eq!(aggregate.files, vec!["transcript-sala1-ana.txt"]);
    }
}
