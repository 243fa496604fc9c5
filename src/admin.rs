//! Data-directory maintenance: export, import, reset, batch operations.
//!
//! Export bundles the managed entries of the data directory into a ZIP with
//! a `metadata.json` stamp; import restores one (optionally merging over the
//! existing state); reset deletes the managed entries outright. The batch
//! operations work on the file tracker: delete untracks matching paths,
//! reindex lists them so the caller can schedule fresh ingests.
//!
//! Only the entries this system owns are ever touched — a data directory
//! shared with anything else keeps its other contents.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::info;

use crate::error::{Error, Result};
use crate::tracker::FileTracker;

/// Data-dir entries owned by this system.
const MANAGED_DIRS: [&str; 4] = ["blobs", "graph", "tfidf", "vector"];
const MANAGED_FILES: [&str; 3] = [
    "file_tracker.json",
    "search_history.json",
    "saved_searches.json",
];

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub include_blobs: bool,
    pub include_graph: bool,
    pub include_tfidf: bool,
    pub include_history: bool,
    pub output_path: Option<PathBuf>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_blobs: true,
            include_graph: true,
            include_tfidf: true,
            include_history: true,
            output_path: None,
        }
    }
}

/// Write a ZIP backup of the data directory; returns the archive path.
pub fn export(data_dir: &Path, opts: &ExportOptions) -> Result<PathBuf> {
    let output = opts.output_path.clone().unwrap_or_else(|| {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        data_dir.join(format!("mnemo_backup_{stamp}.zip"))
    });

    let file = std::fs::File::create(&output)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();

    if opts.include_blobs {
        add_dir(&mut writer, &data_dir.join("blobs"), "blobs", options)?;
    }
    if opts.include_graph {
        add_dir(&mut writer, &data_dir.join("graph"), "graph", options)?;
    }
    if opts.include_tfidf {
        add_dir(&mut writer, &data_dir.join("tfidf"), "tfidf", options)?;
        add_dir(&mut writer, &data_dir.join("vector"), "vector", options)?;
    }

    add_file_if_present(&mut writer, &data_dir.join("file_tracker.json"), "file_tracker.json", options)?;
    if opts.include_history {
        add_file_if_present(&mut writer, &data_dir.join("search_history.json"), "search_history.json", options)?;
        add_file_if_present(&mut writer, &data_dir.join("saved_searches.json"), "saved_searches.json", options)?;
    }

    let metadata = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "exported_at": chrono::Utc::now().to_rfc3339(),
        "data_dir": data_dir.display().to_string(),
    });
    writer.start_file("metadata.json", options)?;
    writer.write_all(&serde_json::to_vec_pretty(&metadata)?)?;

    writer.finish()?;
    info!(output = %output.display(), "export complete");
    Ok(output)
}

/// Restore a ZIP backup into the data directory. Without `merge`, the
/// managed entries are cleared first.
pub fn import(data_dir: &Path, archive_path: &Path, merge: bool) -> Result<()> {
    let file = std::fs::File::open(archive_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound {
                kind: "archive",
                name: archive_path.display().to_string(),
            }
        } else {
            Error::Io(e)
        }
    })?;
    let mut archive = zip::ZipArchive::new(file)?;

    if !merge {
        reset(data_dir)?;
    }

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.name() == "metadata.json" {
            continue;
        }

        let Some(relative) = entry.enclosed_name() else {
            return Err(Error::input(format!(
                "archive entry escapes the data dir: {}",
                entry.name()
            )));
        };
        let out_path = data_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;
    }

    info!(archive = %archive_path.display(), merge, "import complete");
    Ok(())
}

/// Delete every managed entry of the data directory.
pub fn reset(data_dir: &Path) -> Result<()> {
    for dir in MANAGED_DIRS {
        let path = data_dir.join(dir);
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
    }
    for file in MANAGED_FILES {
        let path = data_dir.join(file);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct BatchDeleteOptions {
    /// Substring the tracked path must contain.
    pub path_pattern: Option<String>,
    /// Extension the tracked path must end with (without the dot).
    pub file_type: Option<String>,
    /// Only entries first indexed at least this many days ago. Zero disables
    /// the age filter.
    pub older_than_days: i64,
    pub dry_run: bool,
}

/// Untrack entries matching the filters; returns how many matched. With
/// `dry_run`, nothing is removed.
pub fn batch_delete(tracker: &Mutex<FileTracker>, opts: &BatchDeleteOptions) -> Result<usize> {
    let cutoff = chrono::Utc::now().timestamp() - opts.older_than_days * 86_400;

    let matches: Vec<String> = {
        let tracker = tracker.lock();
        tracker
            .files()
            .iter()
            .filter(|(path, info)| {
                if opts.older_than_days > 0 && info.indexed_at > cutoff {
                    return false;
                }
                matches_path_filters(path, opts.path_pattern.as_deref(), opts.file_type.as_deref())
            })
            .map(|(path, _)| path.clone())
            .collect()
    };

    if opts.dry_run {
        return Ok(matches.len());
    }

    let mut tracker = tracker.lock();
    for path in &matches {
        tracker.remove(path)?;
    }
    Ok(matches.len())
}

/// Tracked paths matching the filters, for rescheduling ingest.
pub fn batch_reindex_paths(
    tracker: &Mutex<FileTracker>,
    path_pattern: Option<&str>,
    file_type: Option<&str>,
) -> Vec<String> {
    tracker
        .lock()
        .files()
        .keys()
        .filter(|path| matches_path_filters(path, path_pattern, file_type))
        .cloned()
        .collect()
}

fn matches_path_filters(path: &str, pattern: Option<&str>, file_type: Option<&str>) -> bool {
    if let Some(pattern) = pattern {
        if !path.contains(pattern) {
            return false;
        }
    }
    if let Some(file_type) = file_type {
        if !path.ends_with(&format!(".{file_type}")) {
            return false;
        }
    }
    true
}

fn add_dir(
    writer: &mut zip::ZipWriter<std::fs::File>,
    source: &Path,
    prefix: &str,
    options: zip::write::SimpleFileOptions,
) -> Result<()> {
    if !source.exists() {
        return Ok(());
    }

    for entry in walkdir::WalkDir::new(source) {
        let entry = entry.map_err(|e| Error::input(format!("walk failed under {prefix}: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source)
            .unwrap_or(entry.path())
            .to_string_lossy();
        let name = format!("{prefix}/{relative}");

        writer.start_file(name, options)?;
        let mut file = std::fs::File::open(entry.path())?;
        std::io::copy(&mut file, writer)?;
    }
    Ok(())
}

fn add_file_if_present(
    writer: &mut zip::ZipWriter<std::fs::File>,
    source: &Path,
    name: &str,
    options: zip::write::SimpleFileOptions,
) -> Result<()> {
    if !source.exists() {
        return Ok(());
    }
    writer.start_file(name, options)?;
    let mut file = std::fs::File::open(source)?;
    std::io::copy(&mut file, writer)?;
    Ok(())
}
