//! End-to-end question answering pipeline.
//!
//! Owns one [`Retriever`], one [`Generator`], one [`ConversationMemory`],
//! and one [`AuditLogger`] for its lifetime, and wires them into the
//! retrieve → prompt → generate → remember → audit flow. The heavyweight
//! resources (embedding model, generation backend) are constructed exactly
//! once here and reused across every question.
//!
//! Initialization either restores a persisted index pair or builds a fresh
//! index from the configured documents folder. A missing folder, or a
//! folder with nothing ingestible in it, aborts initialization — there is
//! nothing to answer from.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::audit::AuditLogger;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generate::{create_generator, GenerationParams, Generator};
use crate::memory::ConversationMemory;
use crate::models::{ConversationTurn, DocumentChunk, LogEntry, QueryFilter};
use crate::prompt::{build_prompt, HISTORY_TURNS};
use crate::retriever::{IngestStats, Retriever, CHUNKS_FILE, VECTORS_FILE};

/// The outcome of one pipeline run.
#[derive(Debug)]
pub struct PipelineAnswer {
    pub answer: String,
    /// Similarity-ranked retrieval results the answer was grounded on.
    pub retrieved: Vec<(DocumentChunk, f32)>,
}

/// Orchestrates one retriever, generator, memory, and audit log.
pub struct Pipeline {
    pub retriever: Retriever,
    generator: Box<dyn Generator>,
    memory: ConversationMemory,
    logger: AuditLogger,
    params: GenerationParams,
    index_dir: PathBuf,
    default_top_k: usize,
}

impl Pipeline {
    /// Assemble a pipeline from already-constructed components.
    pub fn new(
        retriever: Retriever,
        generator: Box<dyn Generator>,
        logger: AuditLogger,
        config: &Config,
    ) -> Self {
        Self {
            retriever,
            generator,
            memory: ConversationMemory::new(),
            logger,
            params: GenerationParams::from_config(&config.generation),
            index_dir: config.index.dir.clone(),
            default_top_k: config.retrieval.top_k,
        }
    }

    /// Construct the pipeline from configuration: restore or build the
    /// index, then bring up the generation backend and audit log.
    pub async fn init(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;

        let index_dir = config.index.dir.clone();
        let have_vectors = index_dir.join(VECTORS_FILE).exists();
        let have_chunks = index_dir.join(CHUNKS_FILE).exists();

        let retriever = if have_vectors || have_chunks {
            // Retriever::load rejects a half-present pair.
            let retriever = Retriever::load(embedder, config, &index_dir)?;
            info!(dir = %index_dir.display(), "loaded persisted index");
            retriever
        } else {
            let paths = collect_ingestible(&config.docs.root)?;
            info!(
                dir = %config.docs.root.display(),
                files = paths.len(),
                "no persisted index; building from documents folder"
            );
            let retriever = Retriever::new(embedder, config);
            let stats = retriever.add_documents(&paths).await?;
            retriever.save(&index_dir)?;
            info!(
                files = stats.files_indexed,
                chunks = stats.chunks_added,
                dir = %index_dir.display(),
                "index built and saved"
            );
            retriever
        };

        let generator = create_generator(&config.generation)?;
        let logger = AuditLogger::new(&config.logging.dir, &config.logging.group_id)?;

        Ok(Self::new(retriever, generator, logger, config))
    }

    /// Answer one question: retrieve, build the prompt, generate, remember
    /// the turn, and audit the cycle.
    ///
    /// Audit failures are reported and swallowed — the caller still gets
    /// the answer.
    pub async fn run(
        &mut self,
        question: &str,
        top_k: Option<usize>,
        filter: Option<&QueryFilter>,
    ) -> Result<PipelineAnswer> {
        let k = top_k.unwrap_or(self.default_top_k);

        let retrieved = self.retriever.query(question, k, filter).await?;
        let chunks: Vec<DocumentChunk> = retrieved.iter().map(|(c, _)| c.clone()).collect();

        let prompt = build_prompt(&chunks, question, self.memory.recent(HISTORY_TURNS));
        let answer = self.generator.generate(&prompt, &self.params).await?;

        self.memory.append(ConversationTurn {
            question: question.to_string(),
            answer: answer.clone(),
        });

        let retrieved_ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        if let Err(e) = self.logger.log(question, &retrieved_ids, &prompt, &answer) {
            warn!("audit logging failed (answer still returned): {}", e);
        }

        Ok(PipelineAnswer { answer, retrieved })
    }

    /// Ingest an upload batch and persist the updated index pair.
    pub async fn ingest(&self, paths: &[PathBuf], rebuild: bool) -> Result<IngestStats> {
        let stats = if rebuild {
            self.retriever.rebuild(paths).await?
        } else {
            self.retriever.add_documents(paths).await?
        };
        self.retriever.save(&self.index_dir)?;
        Ok(stats)
    }

    /// Time one full run. Returns (seconds, answer).
    pub async fn bench(&mut self, question: &str) -> Result<(f64, String)> {
        let start = Instant::now();
        let result = self.run(question, None, None).await?;
        Ok((start.elapsed().as_secs_f64(), result.answer))
    }

    pub fn audit_entries(&self) -> Result<Vec<LogEntry>> {
        self.logger.entries()
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }
}

/// Collect ingestible files under `root`, sorted for deterministic order.
///
/// A missing folder and a folder with no ingestible files are both fatal:
/// the engine would otherwise start with nothing to retrieve from.
pub fn collect_ingestible(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Documents folder '{}' not found", root.display());
    }

    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| crate::models::SourceType::from_path(path).is_some())
        .collect();

    paths.sort();

    if paths.is_empty() {
        bail!(
            "No ingestible .txt/.md/.pdf/.csv files found in '{}'",
            root.display()
        );
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_docs_folder_is_fatal() {
        let err = collect_ingestible(Path::new("/nonexistent/docs")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn folder_without_ingestible_files_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("image.png"), b"png").unwrap();
        let err = collect_ingestible(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("No ingestible"));
    }

    #[test]
    fn collects_supported_files_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.txt"), "b").unwrap();
        std::fs::write(tmp.path().join("a.md"), "a").unwrap();
        std::fs::write(tmp.path().join("skip.json"), "{}").unwrap();

        let paths = collect_ingestible(tmp.path()).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("a.md"));
        assert!(paths[1].ends_with("b.txt"));
    }
}
