//! Path-keyed fingerprints of indexed files.
//!
//! The tracker is how the indexer skips unchanged work: a file whose content
//! hash *and* mtime both match the stored entry is not re-indexed. The whole
//! map is rewritten to `file_tracker.json` on every mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Fingerprint of one indexed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedFile {
    /// SHA-256 of the file contents at index time.
    pub hash: String,
    /// Source mtime, seconds since the epoch.
    pub mtime: i64,
    /// When this path was first indexed (epoch seconds).
    pub indexed_at: i64,
    /// Blob digest (equals `hash`; kept explicit for the export format).
    pub blob_ref: String,
    pub chunk_count: usize,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct FileTracker {
    files: HashMap<String, TrackedFile>,
    #[serde(skip)]
    path: PathBuf,
}

impl FileTracker {
    /// Load the tracker from `<data_dir>/file_tracker.json`; a missing file
    /// yields an empty tracker.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("file_tracker.json");
        let files = std::fs::read(&path)
            .ok()
            .and_then(|data| serde_json::from_slice::<FileTracker>(&data).ok())
            .map(|t| t.files)
            .unwrap_or_default();
        Self { files, path }
    }

    pub fn get(&self, path: &str) -> Option<&TrackedFile> {
        self.files.get(path)
    }

    /// True when the stored entry matches both fingerprint components.
    pub fn is_unchanged(&self, path: &str, hash: &str, mtime: i64) -> bool {
        self.files
            .get(path)
            .is_some_and(|f| f.hash == hash && f.mtime == mtime)
    }

    /// Insert or update an entry and persist. The first-indexed timestamp of
    /// an existing entry is preserved.
    pub fn set(&mut self, path: &str, mut info: TrackedFile) -> Result<()> {
        if let Some(existing) = self.files.get(path) {
            info.indexed_at = existing.indexed_at;
        }
        self.files.insert(path.to_string(), info);
        self.save()
    }

    pub fn remove(&mut self, path: &str) -> Result<bool> {
        let removed = self.files.remove(path).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn count(&self) -> usize {
        self.files.len()
    }

    /// All tracked paths (reindex-all iterates this).
    pub fn paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    /// Full entry map, for batch operations that filter on fingerprints.
    pub fn files(&self) -> &HashMap<String, TrackedFile> {
        &self.files
    }

    fn save(&self) -> Result<()> {
        std::fs::write(&self.path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}
