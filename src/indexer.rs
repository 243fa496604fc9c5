//! Indexing orchestrator.
//!
//! Converts one filesystem path into a coordinated update across the blob
//! store, graph store, embedder, vector index, and file tracker:
//!
//! 1. Read and stat the file; hash its contents.
//! 2. Skip entirely if the tracker shows the same hash *and* mtime.
//! 3. Store the bytes as a blob; derive `doc:<hash>` (identical content at
//!    different paths produces the same document).
//! 4. Extract text, upsert the document node with file metadata.
//! 5. Feed the whole text to the embedder.
//! 6. Chunk at 512 characters on line boundaries; per chunk: embed, add to
//!    the vector index, upsert the chunk node, link `HAS_CHUNK`, recognize
//!    entities, link `HAS_ENTITY`.
//! 7. Record the tracker entry and flush the vector index.
//!
//! A `doc:` node that already exists means the identical bytes were indexed
//! before (possibly from another path), so the chunk set is identical too:
//! chunk nodes are overwritten by ordinal and the document's vector entries
//! are replaced wholesale before re-adding.
//!
//! Embedding or vector failures on individual chunks are logged and skipped;
//! they never abort the document.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::LazyLock;

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::blob::{content_hash, BlobStore};
use crate::embedder::LexicalEmbedder;
use crate::error::Result;
use crate::extractor;
use crate::graph::{Edge, GraphStore, Node};
use crate::tracker::{FileTracker, TrackedFile};
use crate::vector::VectorIndex;

/// Chunk budget in characters. One source line may exceed it, in which case
/// that line becomes a chunk by itself.
const CHUNK_SIZE: usize = 512;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap());
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"{}|\\^`]+"#).unwrap());
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\+?1?[-.\s]?)?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}").unwrap()
});
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b|\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+\d{1,2},?\s+\d{4}\b").unwrap()
});

/// Metadata attached to each vector-index entry. Serialized field order is
/// what the search filters substring-match against.
#[derive(Serialize)]
struct ChunkMeta<'a> {
    doc_id: &'a str,
    chunk: usize,
    path: &'a str,
    file_type: &'a str,
    content_type: &'a str,
}

/// What a single ingest did.
#[derive(Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    Indexed { doc_id: String, chunk_count: usize },
    /// Tracker showed the same hash and mtime; nothing was touched.
    Unchanged,
}

pub struct Indexer {
    blobs: Arc<BlobStore>,
    graph: Arc<GraphStore>,
    vectors: Arc<RwLock<VectorIndex>>,
    embedder: Arc<RwLock<LexicalEmbedder>>,
    tracker: Arc<Mutex<FileTracker>>,
}

impl Indexer {
    /// Open all stores under `data_dir` and assemble the indexer.
    pub fn open(data_dir: &Path, synonyms_path: Option<&Path>) -> Result<Self> {
        Ok(Self {
            blobs: Arc::new(BlobStore::open(data_dir)?),
            graph: Arc::new(GraphStore::open(data_dir)?),
            vectors: Arc::new(RwLock::new(VectorIndex::open(data_dir)?)),
            embedder: Arc::new(RwLock::new(LexicalEmbedder::open(data_dir, synonyms_path))),
            tracker: Arc::new(Mutex::new(FileTracker::load(data_dir))),
        })
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn vectors(&self) -> &RwLock<VectorIndex> {
        &self.vectors
    }

    pub fn embedder(&self) -> &RwLock<LexicalEmbedder> {
        &self.embedder
    }

    pub fn tracker(&self) -> &Mutex<FileTracker> {
        &self.tracker
    }

    /// Index one file end to end. See the module docs for the step sequence.
    pub fn ingest_file(&self, path: &Path) -> Result<IngestOutcome> {
        let content = std::fs::read(path)?;
        let file_meta = std::fs::metadata(path)?;
        let mtime = mtime_secs(&file_meta);
        let path_str = path.to_string_lossy().into_owned();

        let hash = content_hash(&content);
        if self.tracker.lock().is_unchanged(&path_str, &hash, mtime) {
            return Ok(IngestOutcome::Unchanged);
        }

        let blob_hash = self.blobs.put(&content)?;
        let doc_id = format!("doc:{blob_hash}");

        // Same content seen before: its chunk set is identical, so clear the
        // old vector entries and let the loop below rewrite everything.
        if self.graph.get_node(&doc_id).is_ok() {
            self.vectors
                .write()
                .remove_prefix(&format!("chunk:{blob_hash}:"));
        }

        let text = extractor::extract(path, &content);
        let file_type = extractor::file_type(path);
        let content_type = extractor::content_type(path);
        let now = chrono::Utc::now().timestamp();

        let mut props = extractor::metadata(path, file_meta.len(), mtime);
        props.insert("path".into(), path_str.clone().into());

        self.graph.add_node(&Node {
            id: doc_id.clone(),
            node_type: "Document".into(),
            label: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path_str.clone()),
            props,
            blob_ref: Some(blob_hash.clone()),
            created_at: now,
        })?;

        if let Err(e) = self.embedder.write().add_document(&doc_id, &text) {
            warn!(doc = %doc_id, error = %e, "embedder rejected document, continuing");
        }

        let chunks = chunk_text(&text, CHUNK_SIZE);
        for (idx, chunk) in chunks.iter().enumerate() {
            let chunk_id = format!("chunk:{blob_hash}:{idx}");
            let chunk_hash = content_hash(chunk.as_bytes());
            let vector = self.embedder.read().embed(chunk);

            let meta = serde_json::to_string(&ChunkMeta {
                doc_id: &doc_id,
                chunk: idx,
                path: &path_str,
                file_type,
                content_type,
            })?;

            if let Err(e) = self
                .vectors
                .write()
                .add(format!("{chunk_id}:{chunk_hash}"), vector, meta)
            {
                warn!(chunk = %chunk_id, error = %e, "skipping chunk");
                continue;
            }

            let mut chunk_props = serde_json::Map::new();
            chunk_props.insert("text".into(), chunk.clone().into());
            chunk_props.insert("index".into(), idx.into());
            chunk_props.insert("doc_id".into(), doc_id.clone().into());

            self.graph.add_node(&Node {
                id: chunk_id.clone(),
                node_type: "Chunk".into(),
                label: format!("Chunk {idx}"),
                props: chunk_props,
                blob_ref: Some(blob_hash.clone()),
                created_at: now,
            })?;

            self.graph.add_edge(&Edge {
                from: doc_id.clone(),
                to: chunk_id.clone(),
                edge_type: "HAS_CHUNK".into(),
                label: String::new(),
                props: serde_json::Map::new(),
                weight: 0.0,
            })?;

            for entity in extract_entities(chunk) {
                let entity_id = format!(
                    "entity:{}",
                    entity.to_lowercase().replace(char::is_whitespace, "_")
                );

                let mut entity_props = serde_json::Map::new();
                entity_props.insert("name".into(), entity.clone().into());

                self.graph.add_node(&Node {
                    id: entity_id.clone(),
                    node_type: "Entity".into(),
                    label: entity,
                    props: entity_props,
                    blob_ref: None,
                    created_at: now,
                })?;

                self.graph.add_edge(&Edge {
                    from: chunk_id.clone(),
                    to: entity_id,
                    edge_type: "HAS_ENTITY".into(),
                    label: "mentions".into(),
                    props: serde_json::Map::new(),
                    weight: 0.0,
                })?;
            }
        }

        self.tracker.lock().set(
            &path_str,
            TrackedFile {
                hash,
                mtime,
                indexed_at: now,
                blob_ref: blob_hash,
                chunk_count: chunks.len(),
            },
        )?;

        self.vectors.read().save()?;

        Ok(IngestOutcome::Indexed {
            doc_id,
            chunk_count: chunks.len(),
        })
    }

    /// Re-run ingest over every tracked path. Per-file errors are logged and
    /// counted; the loop never aborts. Returns `(ok, failed)`.
    pub fn reindex_all(&self) -> (usize, usize) {
        let paths = self.tracker.lock().paths();

        let mut ok = 0;
        let mut failed = 0;
        for path in paths {
            match self.ingest_file(Path::new(&path)) {
                Ok(_) => ok += 1,
                Err(e) => {
                    warn!(path = %path, error = %e, "reindex failed for file");
                    failed += 1;
                }
            }
        }
        (ok, failed)
    }

    /// Combined statistics for the stats endpoint.
    pub fn stats(&self) -> serde_json::Value {
        serde_json::json!({
            "embedder": self.embedder.read().stats(),
            "file_tracker": {
                "tracked_files": self.tracker.lock().count(),
            },
            "vector_index": {
                "vectors": self.vectors.read().len(),
            },
        })
    }

    /// Flush embedder and vector-index state (used on shutdown).
    pub fn flush(&self) -> Result<()> {
        self.embedder.read().save()?;
        self.vectors.read().save()?;
        Ok(())
    }
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer").finish_non_exhaustive()
    }
}

fn mtime_secs(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Split text on newlines, greedily packing lines until the next one would
/// push the buffer past `size`. A single oversized line becomes its own
/// chunk.
fn chunk_text(text: &str, size: usize) -> Vec<String> {
    if text.len() <= size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.split('\n') {
        if !current.is_empty() && current.len() + 1 + line.len() > size {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Pattern-matched and capitalization-based entities in one chunk of text.
///
/// Emails, URLs, phone numbers, and dates get a type prefix. Every
/// punctuation-trimmed word of three or more characters starting with an
/// uppercase ASCII letter is kept as-is. Deduplicated within the chunk;
/// sentence-initial common words slip through by construction.
fn extract_entities(text: &str) -> Vec<String> {
    let mut entities = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let patterns: [(&Regex, &str); 4] = [
        (&EMAIL_RE, "email:"),
        (&URL_RE, "url:"),
        (&PHONE_RE, "phone:"),
        (&DATE_RE, "date:"),
    ];
    for (re, prefix) in patterns {
        for m in re.find_iter(text) {
            if seen.insert(m.as_str().to_string()) {
                entities.push(format!("{prefix}{}", m.as_str()));
            }
        }
    }

    for word in text.split_whitespace() {
        let word = word.trim_matches(|c: char| ".,!?;:\"'()[]{}".contains(c));
        if word.len() >= 3
            && word.chars().next().is_some_and(|c| c.is_ascii_uppercase())
            && seen.insert(word.to_string())
        {
            entities.push(word.to_string());
        }
    }

    entities
}
