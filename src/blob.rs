//! Content-addressed blob store.
//!
//! Bytes are keyed by their SHA-256 hex digest and laid out two levels deep
//! (`blobs/<first two hex chars>/<remaining 62>`). Because the name *is* the
//! content hash, [`BlobStore::put`] is idempotent: if the target file exists
//! its contents are already identical, so the write is skipped. Identical
//! bytes ingested from any number of paths collapse to a single blob.
//!
//! Concurrent writers of the same hash are safe for the same reason — every
//! writer would write the same bytes.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub struct BlobStore {
    base_dir: PathBuf,
}

impl BlobStore {
    /// Open (creating if needed) the blob store under `<data_dir>/blobs`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let base_dir = data_dir.join("blobs");
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Store `content` and return its SHA-256 hex digest.
    ///
    /// Skips the write when a blob with the same digest already exists.
    pub fn put(&self, content: &[u8]) -> Result<String> {
        let hash = content_hash(content);

        let dir = self.base_dir.join(&hash[..2]);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(&hash[2..]);
        if !path.exists() {
            std::fs::write(&path, content)?;
        }

        Ok(hash)
    }

    /// Fetch a blob by digest.
    pub fn get(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(hash)?;
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound {
                    kind: "blob",
                    name: hash.to_string(),
                }
            } else {
                Error::Io(e)
            }
        })
    }

    /// Whether a blob with this digest is present.
    pub fn has(&self, hash: &str) -> bool {
        self.blob_path(hash).map(|p| p.exists()).unwrap_or(false)
    }

    /// Filesystem location of a blob (whether or not it exists).
    pub fn path(&self, hash: &str) -> Result<PathBuf> {
        self.blob_path(hash)
    }

    fn blob_path(&self, hash: &str) -> Result<PathBuf> {
        if hash.len() < 3 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::input(format!("invalid blob hash: {hash:?}")));
        }
        Ok(self.base_dir.join(&hash[..2]).join(&hash[2..]))
    }
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("base_dir", &self.base_dir)
            .finish()
    }
}

/// SHA-256 hex digest of a byte slice.
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
