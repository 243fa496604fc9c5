//! IVF-style approximate vector index.
//!
//! Vectors are partitioned across a fixed set of `L` = 100 centroids. Each
//! incoming vector joins the inverted list of its nearest centroid (squared
//! Euclidean distance); a search probes the `nprobe` = 10 nearest clusters
//! and ranks their candidates by cosine similarity.
//!
//! Centroids are sampled once from a seeded uniform distribution in
//! `[-1, 1]` and persisted to `centroids.bin` as little-endian `f32`; on
//! later runs they are loaded back, never re-learned. Recall therefore
//! depends on random orientation rather than the data distribution — the
//! price of never retraining — but centroid count and dimension stay stable
//! for the life of the on-disk index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::error::{Error, Result};

pub const DEFAULT_DIMENSION: usize = 8192;
pub const DEFAULT_NLISTS: usize = 100;
pub const DEFAULT_NPROBE: usize = 10;

/// ChaCha8 output is identical on every platform and release, which keeps
/// first-run centroids bit-identical across processes.
const CENTROID_SEED: u64 = 42;

#[derive(Debug, Clone)]
struct IndexedVector {
    id: String,
    vector: Vec<f32>,
    meta: String,
}

/// One search hit: identifier, cosine score, and the metadata JSON supplied
/// at insertion time.
#[derive(Debug, Clone, Serialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub meta: String,
}

pub struct VectorIndex {
    dim: usize,
    nprobe: usize,
    centroids: Vec<Vec<f32>>,
    lists: HashMap<usize, Vec<IndexedVector>>,
    base_dir: PathBuf,
}

impl VectorIndex {
    /// Open the index under `<data_dir>/vector`, loading persisted centroids
    /// or sampling a fresh reproducible set on first run.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let base_dir = data_dir.join("vector");
        std::fs::create_dir_all(&base_dir)?;

        let centroids_file = base_dir.join("centroids.bin");
        let centroids = if centroids_file.exists() {
            load_centroids(&centroids_file, DEFAULT_DIMENSION)?
        } else {
            init_centroids(DEFAULT_NLISTS, DEFAULT_DIMENSION)
        };

        Ok(Self {
            dim: DEFAULT_DIMENSION,
            nprobe: DEFAULT_NPROBE,
            centroids,
            lists: HashMap::new(),
            base_dir,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Number of stored vectors across all clusters.
    pub fn len(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.values().all(Vec::is_empty)
    }

    /// Insert a vector under `id` with an opaque metadata string.
    pub fn add(&mut self, id: impl Into<String>, vector: Vec<f32>, meta: impl Into<String>) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::input(format!(
                "dimension mismatch: got {}, want {}",
                vector.len(),
                self.dim
            )));
        }

        let list_id = self.assign_cluster(&vector);
        self.lists.entry(list_id).or_default().push(IndexedVector {
            id: id.into(),
            vector,
            meta: meta.into(),
        });
        Ok(())
    }

    /// Approximate top-`k` by cosine similarity: probe the `nprobe` nearest
    /// clusters, score their candidates, sort descending.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        if query.len() != self.dim {
            return Err(Error::input(format!(
                "dimension mismatch: got {}, want {}",
                query.len(),
                self.dim
            )));
        }

        let mut hits: Vec<VectorHit> = Vec::new();
        for list_id in self.nearest_clusters(query, self.nprobe) {
            if let Some(list) = self.lists.get(&list_id) {
                for entry in list {
                    hits.push(VectorHit {
                        id: entry.id.clone(),
                        score: cosine_similarity(query, &entry.vector),
                        meta: entry.meta.clone(),
                    });
                }
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    /// Drop every vector whose id starts with `prefix`; returns the number
    /// removed. Used when re-ingesting a document replaces its chunk set.
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let mut removed = 0;
        for list in self.lists.values_mut() {
            let before = list.len();
            list.retain(|entry| !entry.id.starts_with(prefix));
            removed += before - list.len();
        }
        removed
    }

    /// Flush the centroids to `centroids.bin` (little-endian f32).
    pub fn save(&self) -> Result<()> {
        let mut bytes = Vec::with_capacity(self.centroids.len() * self.dim * 4);
        for centroid in &self.centroids {
            for value in centroid {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        std::fs::write(self.base_dir.join("centroids.bin"), bytes)?;
        Ok(())
    }

    fn assign_cluster(&self, vector: &[f32]) -> usize {
        let mut best = 0;
        let mut best_dist = f32::MAX;
        for (i, centroid) in self.centroids.iter().enumerate() {
            let dist = squared_distance(vector, centroid);
            if dist < best_dist {
                best_dist = dist;
                best = i;
            }
        }
        best
    }

    fn nearest_clusters(&self, query: &[f32], nprobe: usize) -> Vec<usize> {
        let mut distances: Vec<(f32, usize)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (squared_distance(query, c), i))
            .collect();

        distances.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        distances.truncate(nprobe);
        distances.into_iter().map(|(_, i)| i).collect()
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dim", &self.dim)
            .field("nlists", &self.centroids.len())
            .field("vectors", &self.len())
            .finish()
    }
}

fn init_centroids(nlists: usize, dim: usize) -> Vec<Vec<f32>> {
    let mut rng = ChaCha8Rng::seed_from_u64(CENTROID_SEED);
    (0..nlists)
        .map(|_| (0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect())
        .collect()
}

fn load_centroids(path: &Path, dim: usize) -> Result<Vec<Vec<f32>>> {
    let data = std::fs::read(path)?;
    let stride = dim * 4;
    if data.len() % stride != 0 {
        return Err(Error::input(format!(
            "centroid file length {} is not a multiple of {stride}",
            data.len()
        )));
    }

    Ok(data
        .chunks_exact(stride)
        .map(|row| {
            row.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        })
        .collect())
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Cosine similarity in `[-1, 1]`; zero for empty or zero-norm input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_vec(hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; DEFAULT_DIMENSION];
        v[hot] = 1.0;
        v
    }

    fn test_index() -> (tempfile::TempDir, VectorIndex) {
        let tmp = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(tmp.path()).unwrap();
        (tmp, index)
    }

    #[test]
    fn centroids_are_reproducible() {
        let a = init_centroids(DEFAULT_NLISTS, DEFAULT_DIMENSION);
        let b = init_centroids(DEFAULT_NLISTS, DEFAULT_DIMENSION);
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_NLISTS);
        assert!(a[0].iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn centroids_survive_save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let first = VectorIndex::open(tmp.path()).unwrap();
        first.save().unwrap();
        let reloaded = VectorIndex::open(tmp.path()).unwrap();
        assert_eq!(first.centroids, reloaded.centroids);
    }

    #[test]
    fn rejects_wrong_dimension() {
        let (_tmp, mut index) = test_index();
        let err = index.add("x", vec![1.0; 3], "{}").unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        assert!(index.search(&[1.0; 3], 5).is_err());
    }

    #[test]
    fn identical_vector_is_top_hit() {
        let (_tmp, mut index) = test_index();
        index.add("a", unit_vec(7), r#"{"doc":"a"}"#).unwrap();
        index.add("b", unit_vec(1234), "{}").unwrap();
        index.add("c", unit_vec(4099), "{}").unwrap();

        let hits = index.search(&unit_vec(7), 3).unwrap();
        assert_eq!(hits[0].id, "a");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
        assert_eq!(hits[0].meta, r#"{"doc":"a"}"#);
    }

    #[test]
    fn search_truncates_to_k() {
        let (_tmp, mut index) = test_index();
        for i in 0..20 {
            index.add(format!("v{i}"), unit_vec(i), "{}").unwrap();
        }
        let hits = index.search(&unit_vec(0), 5).unwrap();
        assert!(hits.len() <= 5);
    }

    #[test]
    fn remove_prefix_drops_matching_ids() {
        let (_tmp, mut index) = test_index();
        index.add("chunk:aaa:0:h0", unit_vec(1), "{}").unwrap();
        index.add("chunk:aaa:1:h1", unit_vec(2), "{}").unwrap();
        index.add("chunk:bbb:0:h2", unit_vec(3), "{}").unwrap();

        let removed = index.remove_prefix("chunk:aaa:");
        assert_eq!(removed, 2);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn cosine_similarity_bounds() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&a, &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
