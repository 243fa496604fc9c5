//! # mnemo
//!
//! **A personal knowledge-indexing engine.**
//!
//! mnemo ingests heterogeneous files from the local filesystem, extracts
//! their text, derives BM25-style sparse embeddings over a hashed
//! vocabulary, and serves ranked semantic retrieval alongside a small
//! property graph connecting documents, chunks, and recognized entities.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────────────┐   ┌───────────┐
//! │ Watcher  │──▶│           Indexer             │──▶│  Stores   │
//! │ / HTTP   │   │ extract → embed → chunk →     │   │ blob/graph│
//! │ ingest   │   │ entities → track              │   │ vec/tfidf │
//! └──────────┘   └───────────────────────────────┘   └─────┬─────┘
//!                                                         │
//!                                    ┌────────────────────┤
//!                                    ▼                    ▼
//!                              ┌──────────┐        ┌──────────┐
//!                              │   CLI    │        │   HTTP   │
//!                              │ (mnemo)  │        │ (axum)   │
//!                              └──────────┘        └──────────┘
//! ```
//!
//! ## Data flow
//!
//! 1. A path arrives from the watcher, the CLI, or `POST /api/v1/ingest`.
//! 2. The [`indexer`] reads the bytes, hashes them, and skips the file if
//!    the [`tracker`] shows the same hash and mtime.
//! 3. Content lands in the [`blob`] store (deduplicated by SHA-256), text
//!    is pulled out by the [`extractor`], and the whole document feeds the
//!    [`embedder`]'s corpus statistics.
//! 4. The text is chunked at 512 characters; each chunk is embedded, added
//!    to the [`vector`] index, and written to the [`graph`] as a `Chunk`
//!    node under its `Document`, with recognized entities linked off each
//!    chunk.
//! 5. A query embeds through the same vocabulary (plus synonym and fuzzy
//!    expansion), probes the nearest IVF clusters, and returns a filtered,
//!    paginated ranking ([`search`]).
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | YAML configuration (`watch_paths`, `http_port`, `data_dir`) |
//! | [`error`] | Crate-wide error type with HTTP status mapping |
//! | [`blob`] | Content-addressed blob store with two-level layout |
//! | [`graph`] | Nodes, edges, adjacency, and bounded BFS over redb |
//! | [`embedder`] | BM25 sparse vectors, incremental IDF, fuzzy + synonym expansion |
//! | [`vector`] | IVF-style index: fixed centroids, inverted lists, cosine top-k |
//! | [`tracker`] | Path → fingerprint map for change detection |
//! | [`extractor`] | Per-format text extraction and file metadata |
//! | [`indexer`] | Orchestrates one path into updates across all stores |
//! | [`search`] | Query embedding, filtering, and pagination |
//! | [`history`] | Search history and saved searches |
//! | [`admin`] | Export/import bundles, reset, batch delete/reindex |
//! | [`watcher`] | Polling scanner that schedules files for indexing |
//! | [`server`] | Axum HTTP façade and bundled web UI |

pub mod admin;
pub mod blob;
pub mod config;
pub mod embedder;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod history;
pub mod indexer;
pub mod search;
pub mod server;
pub mod tracker;
pub mod vector;
pub mod watcher;

pub use error::{Error, Result};
