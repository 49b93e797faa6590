//! Segment file registry
//!
//! Filesystem-backed view over the output directory the recording backend
//! writes into. The store never creates or renames segment files; it only
//! discovers them and reports their metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Metadata for one segment file on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentFile {
    /// Bare filename within the output directory
    pub name: String,

    /// Absolute path to the file
    pub full_path: String,

    /// File size in bytes
    pub size_bytes: u64,

    /// Last modification time
    pub modified: DateTime<Utc>,
}

/// Registry of segment files in the configured output directory
#[derive(Debug, Clone)]
pub struct SegmentStore {
    output_dir: PathBuf,
    video_extensions: Vec<String>,
}

impl SegmentStore {
    /// Create a store over the config's output directory
    pub fn new(config: &Config) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            video_extensions: config.video_extensions.clone(),
        }
    }

    /// The directory this store reads from
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn matches_extension(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.video_extensions
            .iter()
            .any(|ext| lower.ends_with(&format!(".{ext}")))
    }

    /// Segment names must stay inside the output directory.
    fn is_plain_name(name: &str) -> bool {
        !name.is_empty()
            && !name.contains('/')
            && !name.contains('\\')
            && name != "."
            && name != ".."
    }

    /// Resolve a segment name to its on-disk metadata, if it exists
    pub fn resolve(&self, name: &str) -> Option<SegmentFile> {
        if !Self::is_plain_name(name) {
            tracing::warn!(name, "rejecting segment name outside output directory");
            return None;
        }

        let path = self.output_dir.join(name);
        let meta = std::fs::metadata(&path).ok()?;
        if !meta.is_file() {
            return None;
        }

        Some(SegmentFile {
            name: name.to_string(),
            full_path: path.to_string_lossy().to_string(),
            size_bytes: meta.len(),
            modified: meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    /// List all segment files matching the configured video extensions,
    /// newest modification time first
    pub fn list(&self) -> Vec<SegmentFile> {
        let entries = match std::fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("failed to read output directory {:?}: {}", self.output_dir, e);
                return Vec::new();
            }
        };

        let mut files: Vec<SegmentFile> = entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                if !self.matches_extension(&name) {
                    return None;
                }
                let meta = entry.metadata().ok()?;
                if !meta.is_file() {
                    return None;
                }
                Some(SegmentFile {
                    name,
                    full_path: entry.path().to_string_lossy().to_string(),
                    size_bytes: meta.len(),
                    modified: meta
                        .modified()
                        .map(DateTime::<Utc>::from)
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .collect();

        files.sort_by(|a, b| b.modified.cmp(&a.modified));
        files
    }

    /// The most recently modified segment file, if any.
    ///
    /// Degraded-mode discovery for stop events that carry no output path;
    /// directory scans are racy under concurrent writers, so event-carried
    /// paths always win when present.
    pub fn newest(&self) -> Option<SegmentFile> {
        self.list().into_iter().next()
    }

    /// Read a named segment's bytes (query surface)
    pub fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        if !Self::is_plain_name(name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid segment name: {name}"),
            ));
        }
        std::fs::read(self.output_dir.join(name))
    }

    /// Size of an arbitrary file, read from the filesystem
    pub fn file_size(path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn store_in(dir: &Path) -> SegmentStore {
        SegmentStore::new(&Config::new(dir))
    }

    #[test]
    fn test_resolve_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("block_0_x.mkv"), b"data").unwrap();

        let store = store_in(dir.path());
        let seg = store.resolve("block_0_x.mkv").unwrap();
        assert_eq!(seg.size_bytes, 4);
        assert!(seg.full_path.ends_with("block_0_x.mkv"));
        assert!(store.resolve("missing.mkv").is_none());
    }

    #[test]
    fn test_resolve_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.resolve("../etc/passwd").is_none());
        assert!(store.resolve("").is_none());
        assert!(store.read("sub/../../x").is_err());
    }

    #[test]
    fn test_list_filters_and_orders_by_mtime() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.mkv"), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"b").unwrap();
        // mtime granularity on some filesystems is one second
        std::thread::sleep(std::time::Duration::from_millis(1100));
        fs::write(dir.path().join("new.mp4"), b"c").unwrap();

        let store = store_in(dir.path());
        let names: Vec<String> = store.list().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["new.mp4", "old.mkv"]);
        assert_eq!(store.newest().unwrap().name, "new.mp4");
    }
}
