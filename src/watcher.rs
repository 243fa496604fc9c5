//! Polling filesystem watcher.
//!
//! Walks the configured `watch_paths` once at startup, enqueueing every
//! indexable file, then re-walks on a five-second tick and enqueues files
//! modified within the last ten seconds. Each queued path is indexed on its
//! own blocking task; per-file failures are logged and do not stop the
//! watcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::Result;
use crate::extractor;
use crate::indexer::Indexer;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const RECENT_WINDOW: Duration = Duration::from_secs(10);

/// Paths never worth indexing, relative to any watch root.
fn default_excludes() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in ["**/.git/**", "**/target/**", "**/node_modules/**"] {
        builder.add(
            Glob::new(pattern)
                .map_err(|e| crate::error::Error::input(format!("bad exclude glob: {e}")))?,
        );
    }
    builder
        .build()
        .map_err(|e| crate::error::Error::input(format!("exclude globset: {e}")))
}

pub struct Watcher {
    paths: Vec<PathBuf>,
    indexer: Arc<Indexer>,
    excludes: GlobSet,
}

impl Watcher {
    pub fn new(paths: Vec<PathBuf>, indexer: Arc<Indexer>) -> Result<Self> {
        for path in &paths {
            if !path.exists() {
                std::fs::create_dir_all(path)?;
            }
        }
        Ok(Self {
            paths,
            indexer,
            excludes: default_excludes()?,
        })
    }

    /// Run until the process exits: initial scan, then change polling.
    pub async fn run(self) {
        if self.paths.is_empty() {
            return;
        }

        let (tx, mut rx) = mpsc::channel::<PathBuf>(100);

        let scanner = WatchScanner {
            paths: self.paths.clone(),
            excludes: self.excludes,
            tx,
        };
        tokio::spawn(scanner.run());

        while let Some(path) = rx.recv().await {
            let indexer = Arc::clone(&self.indexer);
            tokio::task::spawn_blocking(move || match indexer.ingest_file(&path) {
                Ok(crate::indexer::IngestOutcome::Indexed { doc_id, chunk_count }) => {
                    info!(path = %path.display(), doc = %doc_id, chunks = chunk_count, "indexed");
                }
                Ok(crate::indexer::IngestOutcome::Unchanged) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to index"),
            });
        }
    }
}

struct WatchScanner {
    paths: Vec<PathBuf>,
    excludes: GlobSet,
    tx: mpsc::Sender<PathBuf>,
}

impl WatchScanner {
    async fn run(self) {
        // Initial scan: everything indexable.
        for root in &self.paths {
            self.scan(root, None).await;
        }

        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let cutoff = SystemTime::now() - RECENT_WINDOW;
            for root in &self.paths {
                self.scan(root, Some(cutoff)).await;
            }
        }
    }

    /// Walk one root, sending indexable files; with `modified_after`, only
    /// files touched since the cutoff.
    async fn scan(&self, root: &Path, modified_after: Option<SystemTime>) {
        let entries: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                let relative = e.path().strip_prefix(root).unwrap_or(e.path());
                !self.excludes.is_match(relative)
            })
            .filter(|e| extractor::is_indexable(e.path()))
            .filter(|e| match modified_after {
                None => true,
                Some(cutoff) => e
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .is_some_and(|mtime| mtime > cutoff),
            })
            .map(|e| e.into_path())
            .collect();

        for path in entries {
            if self.tx.send(path).await.is_err() {
                return;
            }
        }
    }
}
