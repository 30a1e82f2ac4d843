//! Filesystem-backed transcript store over an ordered list of roots.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{
    file_header, format_line, transcript_file_name, transcript_room_prefix, Aggregate,
    TranscriptFileInfo, TranscriptStorage,
};

/// Number of lines included in a diagnostics preview.
const PREVIEW_LINES: usize = 3;

pub struct FsStore {
    /// Ordered, highest priority first. Appends always target the first
    /// root; aggregation searches them in order.
    roots: Vec<PathBuf>,
}

impl FsStore {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    fn primary_root(&self) -> Result<&Path> {
        self.roots
            .first()
            .map(PathBuf::as_path)
            .context("No storage roots configured")
    }

    /// Files in `root` matching the room (all owners, or one exact owner).
    async fn matches_in_root(
        &self,
        root: &Path,
        room: &str,
        owner: Option<&str>,
    ) -> Vec<PathBuf> {
        if let Some(owner) = owner {
            let path = root.join(transcript_file_name(room, owner));
            return if path.is_file() { vec![path] } else { Vec::new() };
        }

        let prefix = transcript_room_prefix(room);
        let mut found = Vec::new();
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            // A missing root simply has no matches.
            Err(_) => return found,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&prefix) && name.ends_with(".txt") {
                found.push(entry.path());
            }
        }
        found.sort();
        found
    }
}

#[async_trait]
impl TranscriptStorage for FsStore {
    async fn append(&self, room: &str, owner: &str, speaker: &str, text: &str) -> Result<()> {
        let root = self.primary_root()?;
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("Failed to create storage root {:?}", root))?;

        let path = root.join(transcript_file_name(room, owner));
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open transcript file {:?}", path))?;

        file.write_all(format_line(speaker, text).as_bytes())
            .await
            .with_context(|| format!("Failed to append to transcript file {:?}", path))?;

        debug!(room, owner, "Appended transcript line to {:?}", path);
        Ok(())
    }

    async fn aggregate(&self, room: &str, owner: Option<&str>) -> Result<Aggregate> {
        for root in &self.roots {
            let matches = self.matches_in_root(root, room, owner).await;
            if matches.is_empty() {
                continue;
            }

            // First root with a match wins; later roots are never merged in.
            let mut text = String::new();
            let mut files = Vec::new();
            for path in matches {
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read transcript file {:?}", path))?;
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("transcript");
                text.push_str(&file_header(name, &root.to_string_lossy()));
                text.push_str(&content);
                if !content.ends_with('\n') {
                    text.push('\n');
                }
                files.push(path.to_string_lossy().into_owned());
            }

            info!(
                room,
                files = files.len(),
                root = %root.display(),
                "Aggregated transcript files"
            );
            return Ok(Aggregate { text, files });
        }

        debug!(room, "No transcript files found in any storage root");
        Ok(Aggregate::default())
    }

    async fn delete(&self, files: &[String]) {
        for file in files {
            match tokio::fs::remove_file(file).await {
                Ok(()) => info!("Deleted transcript file {}", file),
                Err(e) => warn!("Failed to delete transcript file {}: {}", file, e),
            }
        }
    }

    async fn list(&self, room: &str) -> Result<Vec<TranscriptFileInfo>> {
        let mut infos = Vec::new();
        for root in &self.roots {
            for path in self.matches_in_root(root, room, None).await {
                let content = tokio::fs::read_to_string(&path).await.unwrap_or_default();
                let lines: Vec<&str> = content.lines().collect();
                infos.push(TranscriptFileInfo {
                    path: path.to_string_lossy().into_owned(),
                    root: root.to_string_lossy().into_owned(),
                    lines: lines.len(),
                    preview: lines
                        .iter()
                        .take(PREVIEW_LINES)
                        .map(|l| l.to_string())
                        .collect(),
                });
            }
        }
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_with(roots: Vec<PathBuf>) -> FsStore {
        FsStore::new(roots)
    }

    #[tokio::test]
    async fn appends_are_additive_and_ordered() {
        let dir = tempdir().unwrap();
        let store = store_with(vec![dir.path().to_path_buf()]);

        for i in 0..3 {
            store
                .append("sala1", "ana", "ana", &format!("mensaje {}", i))
                .await
                .unwrap();
        }

        let aggregate = store.aggregate("sala1", Some("ana")).await.unwrap();
        assert_eq!(aggregate.files.len(), 1);
        let positions: Vec<usize> = (0..3)
            .map(|i| aggregate.text.find(&format!("mensaje {}", i)).unwrap())
            .collect();
        assert!(positions[0] < positions[1] && positions[1] < positions[2]);
    }

    #[tokio::test]
    async fn aggregate_stops_at_first_root_with_a_match() {
        let root_a = tempdir().unwrap();
        let root_b = tempdir().unwrap();

        std::fs::write(
            root_a.path().join("transcript-sala1-ana.txt"),
            "desde la raíz A\n",
        )
        .unwrap();
        std::fs::write(
            root_b.path().join("transcript-sala1-luis.txt"),
            "desde la raíz B\n",
        )
        .unwrap();

        let store = store_with(vec![
            root_a.path().to_path_buf(),
            root_b.path().to_path_buf(),
        ]);
        let aggregate = store.aggregate("sala1", None).await.unwrap();

        assert!(aggregate.text.contains("desde la raíz A"));
        assert!(!aggregate.text.contains("desde la raíz B"));
        assert_eq!(aggregate.files.len(), 1);
    }

    #[tokio::test]
    async fn aggregate_without_owner_collects_all_room_files() {
        let dir = tempdir().unwrap();
        let store = store_with(vec![dir.path().to_path_buf()]);

        store.append("sala1", "ana", "ana", "hola").await.unwrap();
        store.append("sala1", "luis", "luis", "buenas").await.unwrap();
        store.append("sala2", "eva", "eva", "otra sala").await.unwrap();

        let aggregate = store.aggregate("sala1", None).await.unwrap();
        assert_eq!(aggregate.files.len(), 2);
        assert!(aggregate.text.contains("hola"));
        assert!(aggregate.text.contains("buenas"));
        assert!(!aggregate.text.contains("otra sala"));
    }

    #[tokio::test]
    async fn aggregate_is_idempotent_without_new_appends() {
        let dir = tempdir().unwrap();
        let store = store_with(vec![dir.path().to_path_buf()]);
        store.append("sala1", "ana", "ana", "hola").await.unwrap();

        let first = store.aggregate("sala1", None).await.unwrap();
        let second = store.aggregate("sala1", None).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_room_is_an_empty_result_not_an_error() {
        let dir = tempdir().unwrap();
        let store = store_with(vec![dir.path().to_path_buf()]);

        let aggregate = store.aggregate("nadie", None).await.unwrap();
        assert!(aggregate.is_empty());
        assert_eq!(aggregate.text, "");
    }

    #[tokio::test]
    async fn aggregate_prefixes_each_file_with_a_header() {
        let dir = tempdir().unwrap();
        let store = store_with(vec![dir.path().to_path_buf()]);
        store.append("sala1", "ana", "ana", "hola").await.unwrap();

        let aggregate = store.aggregate("sala1", None).await.unwrap();
        assert!(aggregate.text.starts_with("===== transcript-sala1-ana.txt"));
    }

    #[tokio::test]
    async fn delete_is_best_effort() {
        let dir = tempdir().unwrap();
        let store = store_with(vec![dir.path().to_path_buf()]);
        store.append("sala1", "ana", "ana", "hola").await.unwrap();

        let aggregate = store.aggregate("sala1", None).await.unwrap();
        let mut files = aggregate.files.clone();
        files.push("/nonexistent/transcript-x-y.txt".to_string());

        // Must not fail even though one path is missing.
        store.delete(&files).await;
        assert!(store.aggregate("sala1", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_unions_across_roots() {
        let root_a = tempdir().unwrap();
        let root_b = tempdir().unwrap();
        std::fs::write(
            root_a.path().join("transcript-sala1-ana.txt"),
            "uno\ndos\ntres\ncuatro\n",
        )
        .unwrap();
        std::fs::write(root_b.path().join("transcript-sala1-luis.txt"), "solo\n").unwrap();

        let store = store_with(vec![
            root_a.path().to_path_buf(),
            root_b.path().to_path_buf(),
        ]);
        let infos = store.list("sala1").await.unwrap();

        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].lines, 4);
        assert_eq!(infos[0].preview.len(), 3);
        assert_eq!(infos[1].preview, vec!["solo"]);
    }
}
