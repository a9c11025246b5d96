//! Corpus ownership, ingestion, and filtered similarity query.
//!
//! The [`Retriever`] owns the chunk corpus and the [`VectorIndex`] as one
//! unit behind a single `RwLock`: ingestion takes the write lock, queries
//! take read locks, so index mutation and reads never interleave. Row `i`
//! of the index always describes `chunks[i]`.
//!
//! Ingestion is additive — existing chunks are retained across
//! `add_documents` calls — unless the caller asks for a [`rebuild`].
//!
//! [`rebuild`]: Retriever::rebuild

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::embedding::{embed_query, Embedder};
use crate::extract::extract_text_lenient;
use crate::index::{IndexError, VectorIndex};
use crate::models::{DocumentChunk, QueryFilter, SourceType};

/// File name of the persisted vector blob inside the index directory.
pub const VECTORS_FILE: &str = "vectors.bin";
/// File name of the persisted chunk metadata inside the index directory.
pub const CHUNKS_FILE: &str = "chunks.json";

/// Counters reported after an ingestion pass.
#[derive(Debug, Clone, Default)]
pub struct IngestStats {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks_added: usize,
}

/// Snapshot of what the index currently holds.
#[derive(Debug, Clone)]
pub struct IndexSummary {
    pub chunks: usize,
    pub files: usize,
    pub dims: usize,
    pub model: String,
}

struct IndexState {
    index: VectorIndex,
    chunks: Vec<DocumentChunk>,
}

/// Owns the chunk corpus and its vector index; exposes ingestion and
/// filtered query.
pub struct Retriever {
    embedder: Box<dyn Embedder>,
    chunk_size: usize,
    chunk_overlap: usize,
    batch_size: usize,
    state: RwLock<IndexState>,
}

impl Retriever {
    pub fn new(embedder: Box<dyn Embedder>, config: &Config) -> Self {
        let dims = embedder.dims();
        Self {
            embedder,
            chunk_size: config.chunking.size,
            chunk_overlap: config.chunking.overlap,
            batch_size: config.embedding.batch_size,
            state: RwLock::new(IndexState {
                index: VectorIndex::new(dims),
                chunks: Vec::new(),
            }),
        }
    }

    /// Extract, chunk, embed, and index the given files, keeping whatever is
    /// already indexed.
    ///
    /// Files with unsupported extensions are skipped silently; files whose
    /// extraction fails contribute nothing and are counted as skipped.
    pub async fn add_documents(&self, paths: &[PathBuf]) -> Result<IngestStats> {
        self.ingest(paths, false).await
    }

    /// Drop everything indexed so far, then ingest the given files.
    pub async fn rebuild(&self, paths: &[PathBuf]) -> Result<IngestStats> {
        self.ingest(paths, true).await
    }

    async fn ingest(&self, paths: &[PathBuf], clear_first: bool) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        let mut new_chunks: Vec<DocumentChunk> = Vec::new();

        for path in paths {
            let Some(source_type) = SourceType::from_path(path) else {
                debug!(path = %path.display(), "skipping unsupported extension");
                stats.files_skipped += 1;
                continue;
            };

            let text = extract_text_lenient(path, source_type);
            if text.trim().is_empty() {
                stats.files_skipped += 1;
                continue;
            }

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let date = derive_date(path);

            let chunks = chunk_document(
                &path.to_string_lossy(),
                &file_name,
                source_type,
                &date,
                &text,
                self.chunk_size,
                self.chunk_overlap,
            )?;

            stats.files_indexed += 1;
            stats.chunks_added += chunks.len();
            new_chunks.extend(chunks);
        }

        if new_chunks.is_empty() && !clear_first {
            return Ok(stats);
        }

        // Embed in batches before taking the write lock; the lock only
        // covers the index append itself.
        let texts: Vec<String> = new_chunks.iter().map(|c| c.text.clone()).collect();
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let mut batch_vecs = self.embedder.embed(batch).await?;
            vectors.append(&mut batch_vecs);
        }

        let ids: Vec<String> = new_chunks.iter().map(|c| c.id.clone()).collect();

        let mut state = write_lock(&self.state)?;
        if clear_first {
            state.index.clear();
            state.chunks.clear();
        }
        state.index.add(&vectors, &ids)?;
        state.chunks.extend(new_chunks);

        Ok(stats)
    }

    /// Retrieve the chunks most similar to `question`.
    ///
    /// The question is embedded, the `top_k` nearest rows are taken from the
    /// index, and `filter` is then applied to those candidates. Because the
    /// filter runs after top-k selection, a filtered query can return fewer
    /// than `top_k` results (possibly none) even when matching chunks exist
    /// beyond the candidate window.
    ///
    /// Fails with [`IndexError::NotReady`] before any documents are indexed.
    pub async fn query(
        &self,
        question: &str,
        top_k: usize,
        filter: Option<&QueryFilter>,
    ) -> Result<Vec<(DocumentChunk, f32)>> {
        {
            let state = read_lock(&self.state)?;
            if state.index.is_empty() {
                return Err(IndexError::NotReady.into());
            }
        }

        let query_vec = embed_query(self.embedder.as_ref(), question).await?;

        let state = read_lock(&self.state)?;
        let hits = state.index.search(&query_vec, top_k)?;

        let results = hits
            .into_iter()
            .map(|hit| (state.chunks[hit.position].clone(), hit.score))
            .filter(|(chunk, _)| filter.map_or(true, |f| f.matches(chunk)))
            .collect();

        Ok(results)
    }

    /// Write the index pair (`vectors.bin` + `chunks.json`) into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index dir {}", dir.display()))?;

        let state = read_lock(&self.state)?;

        let chunks_json = serde_json::to_string_pretty(&state.chunks)?;
        std::fs::write(dir.join(CHUNKS_FILE), chunks_json)
            .with_context(|| "Failed to write chunk metadata")?;
        state.index.save(&dir.join(VECTORS_FILE))?;

        Ok(())
    }

    /// Restore a retriever from a persisted index pair.
    ///
    /// Fails when either artifact is missing while the other is present, or
    /// when the pair does not come from the same save; a half-restored index
    /// would silently join vectors to the wrong chunks.
    pub fn load(embedder: Box<dyn Embedder>, config: &Config, dir: &Path) -> Result<Self> {
        let vectors_path = dir.join(VECTORS_FILE);
        let chunks_path = dir.join(CHUNKS_FILE);

        match (vectors_path.exists(), chunks_path.exists()) {
            (true, true) => {}
            (false, false) => {
                anyhow::bail!("No persisted index in {}", dir.display())
            }
            (present_vectors, _) => {
                let missing = if present_vectors { CHUNKS_FILE } else { VECTORS_FILE };
                anyhow::bail!(
                    "Persisted index in {} is incomplete: {} is missing; \
                     refusing to load half of the pair",
                    dir.display(),
                    missing
                )
            }
        }

        let chunks_json = std::fs::read_to_string(&chunks_path)
            .with_context(|| format!("Failed to read {}", chunks_path.display()))?;
        let chunks: Vec<DocumentChunk> = serde_json::from_str(&chunks_json)
            .with_context(|| format!("Failed to parse {}", chunks_path.display()))?;

        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let index = VectorIndex::load(&vectors_path, ids)?;

        if index.dims() != embedder.dims() {
            warn!(
                persisted = index.dims(),
                embedder = embedder.dims(),
                "persisted index dimensionality differs from the configured embedder; \
                 queries will fail until the index is rebuilt"
            );
        }

        Ok(Self {
            embedder,
            chunk_size: config.chunking.size,
            chunk_overlap: config.chunking.overlap,
            batch_size: config.embedding.batch_size,
            state: RwLock::new(IndexState { index, chunks }),
        })
    }

    /// True once at least one chunk is indexed.
    pub fn is_ready(&self) -> bool {
        read_lock(&self.state).map(|s| !s.index.is_empty()).unwrap_or(false)
    }

    pub fn summary(&self) -> Result<IndexSummary> {
        let state = read_lock(&self.state)?;
        let mut files: Vec<&str> = state.chunks.iter().map(|c| c.source_path.as_str()).collect();
        files.sort_unstable();
        files.dedup();

        Ok(IndexSummary {
            chunks: state.chunks.len(),
            files: files.len(),
            dims: state.index.dims(),
            model: self.embedder.model_name().to_string(),
        })
    }
}

fn read_lock(lock: &RwLock<IndexState>) -> Result<std::sync::RwLockReadGuard<'_, IndexState>> {
    lock.read().map_err(|_| anyhow::anyhow!("index lock poisoned"))
}

fn write_lock(lock: &RwLock<IndexState>) -> Result<std::sync::RwLockWriteGuard<'_, IndexState>> {
    lock.write().map_err(|_| anyhow::anyhow!("index lock poisoned"))
}

/// Derive a chunk date for a source file: an ISO date embedded in the file
/// name wins, then the file's modification time, then `"unknown"`.
pub fn derive_date(path: &Path) -> String {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if let Some(date) = date_in_name(name) {
            return date;
        }
    }

    if let Ok(metadata) = std::fs::metadata(path) {
        if let Ok(modified) = metadata.modified() {
            let dt: chrono::DateTime<chrono::Utc> = modified.into();
            return dt.format("%Y-%m-%d").to_string();
        }
    }

    "unknown".to_string()
}

fn date_in_name(name: &str) -> Option<String> {
    if name.len() < 10 {
        return None;
    }
    for i in 0..=name.len() - 10 {
        if !name.is_char_boundary(i) || !name.is_char_boundary(i + 10) {
            continue;
        }
        let window = &name[i..i + 10];
        if NaiveDate::parse_from_str(window, "%Y-%m-%d").is_ok() {
            return Some(window.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_found_inside_filename() {
        assert_eq!(
            date_in_name("meeting-notes-2024-03-15.md"),
            Some("2024-03-15".to_string())
        );
        assert_eq!(date_in_name("2023-01-02_report.pdf"), Some("2023-01-02".to_string()));
    }

    #[test]
    fn no_date_in_plain_names() {
        assert_eq!(date_in_name("notes.md"), None);
        assert_eq!(date_in_name("1234-56-78_not_a_date.txt"), None);
    }

    #[test]
    fn mtime_fallback_produces_iso_date() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let date = derive_date(f.path());
        assert_ne!(date, "unknown");
        assert!(NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_ok());
    }

    #[test]
    fn missing_file_has_unknown_date() {
        assert_eq!(derive_date(Path::new("/nonexistent/whatever.txt")), "unknown");
    }
}
