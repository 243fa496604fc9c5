//! BM25 sparse lexical embedder with a hashed vocabulary.
//!
//! Maps text to a unit-norm vector of fixed dimension `D` (default 8192).
//! Term positions come from FNV-1a-32 modulo `D` (the hashing trick), so no
//! dense vocabulary array is ever materialized; collisions are accepted. The
//! `vocab` set exists purely so fuzzy query expansion has something to scan.
//!
//! Corpus statistics are maintained incrementally. Adding a document updates
//! document counts, lengths, the running average length, and a
//! document-count-weighted approximation of IDF:
//!
//! ```text
//! newIDF(t) = ln((docCount + 1) / (df(t) + 1)) + 1
//! IDF(t)   ← (oldIDF · oldDocCount + newIDF) / docCount
//! ```
//!
//! Exact IDF would require a corpus rescan; property tests should assert the
//! monotone trend, not exact values.
//!
//! Document vectors are BM25-weighted (`k1` = 1.5, `b` = 0.75, tf = log1p).
//! Query vectors add synonym expansion at full weight and fuzzy vocabulary
//! matches at `0.5 · (1 / (dist + 1)) · IDF`. All vectors are L2-normalized;
//! empty input yields the zero vector.
//!
//! State persists as JSON under `<data_dir>/tfidf/`: `vocab.json`,
//! `idf.json`, `vectors.json`, and `meta.json`.

mod fuzzy;
mod tokenize;

pub use tokenize::{tokenize, TokenizeOptions};

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_DIMENSION: usize = 8192;

/// Tuning knobs. The defaults are what the rest of the system assumes.
#[derive(Debug, Clone)]
pub struct EmbedderOptions {
    pub dimension: usize,
    pub k1: f32,
    pub b: f32,
    pub ngrams: bool,
    pub ngram_range: usize,
    pub fuzzy: bool,
    pub fuzzy_threshold: usize,
    pub code_tokens: bool,
}

impl Default for EmbedderOptions {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            k1: 1.5,
            b: 0.75,
            ngrams: true,
            ngram_range: 3,
            fuzzy: true,
            fuzzy_threshold: 2,
            code_tokens: true,
        }
    }
}

/// Snapshot of embedder state for the stats endpoint.
#[derive(Debug, Serialize)]
pub struct EmbedderStats {
    pub doc_count: usize,
    pub vocab_size: usize,
    pub avg_doc_len: f32,
    pub dimension: usize,
    pub algorithm: &'static str,
    pub k1: f32,
    pub b: f32,
    pub use_ngrams: bool,
    pub ngram_range: usize,
    pub use_fuzzy: bool,
    pub fuzzy_threshold: usize,
    pub use_code_tokens: bool,
    pub synonyms_loaded: usize,
}

#[derive(Serialize, Deserialize)]
struct MetaFile {
    doc_count: usize,
    doc_lengths: HashMap<String, usize>,
    avg_doc_length: f32,
}

pub struct LexicalEmbedder {
    opts: EmbedderOptions,
    base_dir: PathBuf,
    vocab: BTreeSet<String>,
    idf: HashMap<String, f32>,
    doc_count: usize,
    doc_lengths: HashMap<String, usize>,
    total_terms: usize,
    avg_doc_length: f32,
    vectors: HashMap<String, Vec<f32>>,
    synonyms: HashMap<String, Vec<String>>,
}

impl LexicalEmbedder {
    /// Open the embedder with default options, loading any persisted state
    /// under `<data_dir>/tfidf` and a synonyms map if one is found.
    pub fn open(data_dir: &Path, synonyms_path: Option<&Path>) -> Self {
        Self::open_with_options(data_dir, EmbedderOptions::default(), synonyms_path)
    }

    pub fn open_with_options(
        data_dir: &Path,
        opts: EmbedderOptions,
        synonyms_path: Option<&Path>,
    ) -> Self {
        let mut embedder = Self {
            opts,
            base_dir: data_dir.join("tfidf"),
            vocab: BTreeSet::new(),
            idf: HashMap::new(),
            doc_count: 0,
            doc_lengths: HashMap::new(),
            total_terms: 0,
            avg_doc_length: 0.0,
            vectors: HashMap::new(),
            synonyms: load_synonyms(synonyms_path),
        };

        // Best effort: a fresh data dir simply has nothing to load.
        let _ = embedder.load();

        embedder
    }

    pub fn dimension(&self) -> usize {
        self.opts.dimension
    }

    pub fn doc_count(&self) -> usize {
        self.doc_count
    }

    /// Stored document vector, if `id` has been added.
    pub fn vector(&self, id: &str) -> Option<&Vec<f32>> {
        self.vectors.get(id)
    }

    /// Register a document's terms into the corpus statistics and store its
    /// BM25 vector. Documents with no extractable terms are ignored.
    ///
    /// Re-adding an id replaces its stored length rather than growing the
    /// document count, so `doc_count` always equals the size of the length
    /// table.
    pub fn add_document(&mut self, id: &str, text: &str) -> Result<()> {
        let terms = tokenize(text, self.token_opts());
        if terms.is_empty() {
            return Ok(());
        }

        let doc_tf = compute_tf(&terms);
        for term in doc_tf.keys() {
            self.vocab.insert(term.clone());
        }

        let old_doc_count = self.doc_count;
        let doc_length = terms.len();
        let previous = self.doc_lengths.insert(id.to_string(), doc_length);
        if previous.is_none() {
            self.doc_count += 1;
        }
        self.total_terms = self.total_terms + doc_length - previous.unwrap_or(0);
        self.avg_doc_length = self.total_terms as f32 / self.doc_count as f32;

        // Each unique term of this document contributes df = 1.
        for term in doc_tf.keys() {
            let df = 1.0f64;
            let new_idf = ((self.doc_count as f64 + 1.0) / (df + 1.0)).ln() as f32 + 1.0;
            let old_idf = self.idf.get(term).copied().unwrap_or(0.0);
            let updated = if old_idf == 0.0 {
                new_idf
            } else {
                (old_idf * old_doc_count as f32 + new_idf) / self.doc_count as f32
            };
            self.idf.insert(term.clone(), updated);
        }

        let mut vec = vec![0.0f32; self.opts.dimension];
        let doc_len = doc_length as f32;
        for (term, tf) in &doc_tf {
            let idf = self.idf_or_default(term);
            let tf_norm = (tf * (self.opts.k1 + 1.0))
                / (tf
                    + self.opts.k1
                        * (1.0 - self.opts.b + self.opts.b * doc_len / self.avg_doc_length));
            vec[self.hash_term(term)] = tf_norm * idf;
        }
        l2_normalize(&mut vec);
        self.vectors.insert(id.to_string(), vec);

        self.save()
    }

    /// Embed query (or chunk) text: tokenize, expand synonyms at full
    /// weight, deposit `log1p(freq) · IDF` at each hashed position, add
    /// fuzzy vocabulary matches at half weight, and normalize.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let terms = tokenize(text, self.token_opts());

        let mut all_terms = terms.clone();
        all_terms.extend(self.expand_synonyms(&terms));

        let tf = compute_tf(&all_terms);

        let mut vec = vec![0.0f32; self.opts.dimension];
        for (term, freq) in &tf {
            vec[self.hash_term(term)] = freq * self.idf_or_default(term);
        }

        if self.opts.fuzzy && !terms.is_empty() {
            let matches =
                fuzzy::find_fuzzy_matches(&terms, self.vocab.iter(), self.opts.fuzzy_threshold);
            for (term, freq) in matches {
                vec[self.hash_term(&term)] += freq * self.idf_or_default(&term) * 0.5;
            }
        }

        l2_normalize(&mut vec);
        vec
    }

    pub fn stats(&self) -> EmbedderStats {
        EmbedderStats {
            doc_count: self.doc_count,
            vocab_size: self.vocab.len(),
            avg_doc_len: self.avg_doc_length,
            dimension: self.opts.dimension,
            algorithm: "BM25",
            k1: self.opts.k1,
            b: self.opts.b,
            use_ngrams: self.opts.ngrams,
            ngram_range: self.opts.ngram_range,
            use_fuzzy: self.opts.fuzzy,
            fuzzy_threshold: self.opts.fuzzy_threshold,
            use_code_tokens: self.opts.code_tokens,
            synonyms_loaded: self.synonyms.len(),
        }
    }

    /// Flush all state to `<data_dir>/tfidf/*.json`.
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;

        std::fs::write(
            self.base_dir.join("vocab.json"),
            serde_json::to_vec(&self.vocab)?,
        )?;
        std::fs::write(self.base_dir.join("idf.json"), serde_json::to_vec(&self.idf)?)?;
        std::fs::write(
            self.base_dir.join("vectors.json"),
            serde_json::to_vec(&self.vectors)?,
        )?;

        let meta = MetaFile {
            doc_count: self.doc_count,
            doc_lengths: self.doc_lengths.clone(),
            avg_doc_length: self.avg_doc_length,
        };
        std::fs::write(self.base_dir.join("meta.json"), serde_json::to_vec(&meta)?)?;

        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        self.vocab = serde_json::from_slice(&std::fs::read(self.base_dir.join("vocab.json"))?)?;
        self.idf = serde_json::from_slice(&std::fs::read(self.base_dir.join("idf.json"))?)?;
        self.vectors = serde_json::from_slice(&std::fs::read(self.base_dir.join("vectors.json"))?)?;

        let meta: MetaFile =
            serde_json::from_slice(&std::fs::read(self.base_dir.join("meta.json"))?)?;
        self.doc_count = meta.doc_count;
        self.doc_lengths = meta.doc_lengths;
        self.avg_doc_length = meta.avg_doc_length;
        self.total_terms = self.doc_lengths.values().sum();

        Ok(())
    }

    fn token_opts(&self) -> TokenizeOptions {
        TokenizeOptions {
            code_tokens: self.opts.code_tokens,
            ngrams: self.opts.ngrams,
            ngram_range: self.opts.ngram_range,
        }
    }

    /// IDF of a term, falling back to `ln(docCount + 1) + 1` for terms the
    /// corpus has never seen.
    fn idf_or_default(&self, term: &str) -> f32 {
        match self.idf.get(term) {
            Some(&idf) if idf != 0.0 => idf,
            _ => (self.doc_count as f32 + 1.0).ln() + 1.0,
        }
    }

    fn hash_term(&self, term: &str) -> usize {
        fnv1a32(term) as usize % self.opts.dimension
    }

    fn expand_synonyms(&self, terms: &[String]) -> Vec<String> {
        let mut expanded = Vec::new();
        let mut seen: BTreeSet<&str> = BTreeSet::new();

        for term in terms {
            if let Some(synonyms) = self.synonyms.get(term) {
                for syn in synonyms {
                    if syn != term && seen.insert(syn) {
                        expanded.push(syn.clone());
                    }
                }
            }
        }
        expanded
    }
}

impl std::fmt::Debug for LexicalEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalEmbedder")
            .field("dimension", &self.opts.dimension)
            .field("doc_count", &self.doc_count)
            .field("vocab_size", &self.vocab.len())
            .finish_non_exhaustive()
    }
}

/// Term frequencies with log damping: `tf(t) = ln(1 + count(t))`.
fn compute_tf(terms: &[String]) -> HashMap<String, f32> {
    let mut counts: HashMap<String, f32> = HashMap::new();
    for term in terms {
        *counts.entry(term.clone()).or_insert(0.0) += 1.0;
    }
    for value in counts.values_mut() {
        *value = value.ln_1p();
    }
    counts
}

/// FNV-1a, 32-bit. The position of a term in the embedding is
/// `fnv1a32(term) mod D`, which must be stable across processes.
fn fnv1a32(term: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in term.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

fn load_synonyms(explicit: Option<&Path>) -> HashMap<String, Vec<String>> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    candidates.push(PathBuf::from("config").join("synonyms.json"));

    for path in candidates {
        if let Ok(data) = std::fs::read(&path) {
            if let Ok(map) = serde_json::from_slice(&data) {
                return map;
            }
        }
    }
    HashMap::new()
}
