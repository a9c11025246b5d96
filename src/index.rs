//! Flat inner-product vector index.
//!
//! Stores L2-normalized embedding vectors in insertion order next to the
//! chunk ids they belong to. Because every vector is normalized before both
//! add and search, the inner product equals cosine similarity; scores are
//! in `[-1, 1]`.
//!
//! Row position is the join key to the retriever's chunk corpus: row `i` of
//! the index always describes chunk `i` of the corpus, and
//! `index.len() == corpus.len()` must hold whenever the index is queryable.
//! The persisted form is a binary blob carrying dims, row count, and a
//! SHA-256 digest of the id sequence, so loading it against a chunk file
//! from a different save fails instead of silently joining mismatched rows.

use std::io::{Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

const MAGIC: &[u8; 4] = b"CQVX";
const FORMAT_VERSION: u32 = 1;

/// Error type for index operations.
#[derive(Debug)]
pub enum IndexError {
    /// A vector's width does not match the index dimensionality.
    DimensionMismatch { expected: usize, got: usize },
    /// The number of vectors and chunk ids passed to `add` differ.
    IdCountMismatch { vectors: usize, ids: usize },
    /// Query against an index with no rows.
    NotReady,
    /// The vector blob and the chunk metadata do not come from the same save.
    PairMismatch(String),
    /// The vector blob is unreadable or structurally invalid.
    Corrupt(String),
    Io(String),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::DimensionMismatch { expected, got } => {
                write!(f, "embedding dimension mismatch: expected {}, got {}", expected, got)
            }
            IndexError::IdCountMismatch { vectors, ids } => {
                write!(f, "vector/id count mismatch: {} vectors, {} ids", vectors, ids)
            }
            IndexError::NotReady => write!(f, "index not ready: no documents have been indexed"),
            IndexError::PairMismatch(e) => {
                write!(f, "vector blob does not match chunk metadata: {}", e)
            }
            IndexError::Corrupt(e) => write!(f, "corrupt vector blob: {}", e),
            IndexError::Io(e) => write!(f, "index I/O failed: {}", e),
        }
    }
}

impl std::error::Error for IndexError {}

/// One search result row.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Insertion position, the join key into the chunk corpus.
    pub position: usize,
    pub chunk_id: String,
    pub score: f32,
}

/// Append-only flat index over unit-length vectors.
#[derive(Debug)]
pub struct VectorIndex {
    dims: usize,
    /// Row-major vector data, `dims * len()` floats.
    data: Vec<f32>,
    ids: Vec<String>,
}

impl VectorIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            data: Vec::new(),
            ids: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.ids.clear();
    }

    /// Append vectors with their chunk ids, normalizing each to unit length.
    pub fn add(&mut self, vectors: &[Vec<f32>], chunk_ids: &[String]) -> Result<(), IndexError> {
        if vectors.len() != chunk_ids.len() {
            return Err(IndexError::IdCountMismatch {
                vectors: vectors.len(),
                ids: chunk_ids.len(),
            });
        }
        for v in vectors {
            if v.len() != self.dims {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dims,
                    got: v.len(),
                });
            }
        }

        for (v, id) in vectors.iter().zip(chunk_ids.iter()) {
            let mut row = v.clone();
            normalize_l2(&mut row);
            self.data.extend_from_slice(&row);
            self.ids.push(id.clone());
        }
        Ok(())
    }

    /// Return up to `k` rows by descending inner product (== cosine, since
    /// rows and query are unit length). Ties break by ascending insertion
    /// position, so repeated searches are stable. `k = 0` is an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if self.is_empty() {
            return Err(IndexError::NotReady);
        }
        if query.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                got: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut q = query.to_vec();
        normalize_l2(&mut q);

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(position, row)| SearchHit {
                position,
                chunk_id: self.ids[position].clone(),
                score: dot(&q, row),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Write the vector blob to `path`.
    ///
    /// Layout: magic, format version, dims, row count, SHA-256 over the id
    /// sequence, then row-major little-endian f32 data. The digest ties the
    /// blob to the chunk metadata written alongside it.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let mut out = Vec::with_capacity(52 + self.data.len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.dims as u32).to_le_bytes());
        out.extend_from_slice(&(self.ids.len() as u64).to_le_bytes());
        out.extend_from_slice(&id_digest(&self.ids));
        out.extend_from_slice(&vec_to_blob(&self.data));

        let mut file = std::fs::File::create(path).map_err(|e| IndexError::Io(e.to_string()))?;
        file.write_all(&out).map_err(|e| IndexError::Io(e.to_string()))?;
        Ok(())
    }

    /// Read a vector blob and re-attach the chunk ids persisted next to it.
    ///
    /// Fails with [`IndexError::PairMismatch`] when the blob's row count or
    /// id digest disagrees with `chunk_ids` — i.e. when the two artifacts do
    /// not come from the same save.
    pub fn load(path: &Path, chunk_ids: Vec<String>) -> Result<Self, IndexError> {
        let mut bytes = Vec::new();
        std::fs::File::open(path)
            .map_err(|e| IndexError::Io(e.to_string()))?
            .read_to_end(&mut bytes)
            .map_err(|e| IndexError::Io(e.to_string()))?;

        if bytes.len() < 52 {
            return Err(IndexError::Corrupt("blob shorter than header".to_string()));
        }
        if &bytes[0..4] != MAGIC {
            return Err(IndexError::Corrupt("bad magic".to_string()));
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!("unsupported format version {}", version)));
        }
        let dims = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let count = u64::from_le_bytes(bytes[12..20].try_into().unwrap()) as usize;
        let digest: [u8; 32] = bytes[20..52].try_into().unwrap();

        if count != chunk_ids.len() {
            return Err(IndexError::PairMismatch(format!(
                "blob has {} rows, chunk metadata has {}",
                count,
                chunk_ids.len()
            )));
        }
        if digest != id_digest(&chunk_ids) {
            return Err(IndexError::PairMismatch(
                "chunk id digest differs; artifacts come from different saves".to_string(),
            ));
        }

        let data = blob_to_vec(&bytes[52..]);
        if data.len() != dims * count {
            return Err(IndexError::Corrupt(format!(
                "expected {} floats, found {}",
                dims * count,
                data.len()
            )));
        }

        Ok(Self {
            dims,
            data,
            ids: chunk_ids,
        })
    }
}

/// Scale a vector to unit length in place. Zero vectors are left as-is.
pub fn normalize_l2(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Encode a float slice as little-endian f32 bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn id_digest(ids: &[String]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update((id.len() as u64).to_le_bytes());
        hasher.update(id.as_bytes());
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn add_rejects_wrong_dimension() {
        let mut index = VectorIndex::new(3);
        let err = index
            .add(&[vec![1.0, 0.0]], &ids(&["a_chunk0"]))
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, got: 2 }));
    }

    #[test]
    fn add_rejects_id_count_mismatch() {
        let mut index = VectorIndex::new(2);
        let err = index
            .add(&[vec![1.0, 0.0], vec![0.0, 1.0]], &ids(&["only_one"]))
            .unwrap_err();
        assert!(matches!(err, IndexError::IdCountMismatch { .. }));
    }

    #[test]
    fn search_on_empty_index_is_not_ready() {
        let index = VectorIndex::new(2);
        assert!(matches!(index.search(&[1.0, 0.0], 3), Err(IndexError::NotReady)));
    }

    #[test]
    fn search_k_zero_is_empty() {
        let mut index = VectorIndex::new(2);
        index.add(&[vec![1.0, 0.0]], &ids(&["a_chunk0"])).unwrap();
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn search_never_exceeds_k_or_len() {
        let mut index = VectorIndex::new(2);
        index
            .add(
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
                &ids(&["a_chunk0", "a_chunk1"]),
            )
            .unwrap();
        assert_eq!(index.search(&[1.0, 0.0], 1).unwrap().len(), 1);
        assert_eq!(index.search(&[1.0, 0.0], 10).unwrap().len(), 2);
    }

    #[test]
    fn scores_are_cosine_and_ordered() {
        let mut index = VectorIndex::new(2);
        // Unnormalized inputs: normalization must make magnitude irrelevant.
        index
            .add(
                &[vec![10.0, 0.0], vec![0.0, 0.5], vec![3.0, 3.0]],
                &ids(&["x_chunk0", "y_chunk0", "z_chunk0"]),
            )
            .unwrap();

        let hits = index.search(&[2.0, 0.0], 3).unwrap();
        assert_eq!(hits[0].chunk_id, "x_chunk0");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].chunk_id, "z_chunk0");
        assert!((hits[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
        assert_eq!(hits[2].chunk_id, "y_chunk0");
        assert!(hits[2].score.abs() < 1e-6);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut index = VectorIndex::new(2);
        index
            .add(
                &[vec![1.0, 0.0], vec![2.0, 0.0], vec![0.5, 0.0]],
                &ids(&["first", "second", "third"]),
            )
            .unwrap();

        // All three normalize to the same unit vector: identical scores.
        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        let order: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn save_load_roundtrip_preserves_search_results() {
        let tmp = tempfile::tempdir().unwrap();
        let blob = tmp.path().join("vectors.bin");

        let mut index = VectorIndex::new(3);
        let the_ids = ids(&["a_chunk0", "a_chunk1", "b_chunk0"]);
        index
            .add(
                &[vec![1.0, 0.2, 0.0], vec![0.1, 1.0, 0.3], vec![0.0, 0.4, 1.0]],
                &the_ids,
            )
            .unwrap();
        index.save(&blob).unwrap();

        let restored = VectorIndex::load(&blob, the_ids).unwrap();
        let query = [0.3, 0.9, 0.1];
        let before = index.search(&query, 3).unwrap();
        let after = restored.search(&query, 3).unwrap();

        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a.chunk_id, b.chunk_id);
            assert_eq!(a.score, b.score);
        }
    }

    #[test]
    fn load_rejects_mismatched_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let blob = tmp.path().join("vectors.bin");

        let mut index = VectorIndex::new(2);
        index
            .add(&[vec![1.0, 0.0]], &ids(&["a_chunk0"]))
            .unwrap();
        index.save(&blob).unwrap();

        // Same count, different ids: must fail loudly.
        let err = VectorIndex::load(&blob, ids(&["b_chunk0"])).unwrap_err();
        assert!(matches!(err, IndexError::PairMismatch(_)));

        // Different count: must also fail.
        let err = VectorIndex::load(&blob, ids(&["a_chunk0", "a_chunk1"])).unwrap_err();
        assert!(matches!(err, IndexError::PairMismatch(_)));
    }

    #[test]
    fn load_rejects_garbage_blob() {
        let tmp = tempfile::tempdir().unwrap();
        let blob = tmp.path().join("vectors.bin");
        std::fs::write(&blob, b"definitely not an index").unwrap();
        let err = VectorIndex::load(&blob, ids(&["a_chunk0"])).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)));
    }

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }
}
