//! Retrieval-quality evaluation against a labeled benchmark.
//!
//! Scores a [`Retriever`] with recall@k and macro-averaged
//! precision/recall/F1@k over [`BenchmarkCase`]s loaded from a JSON file.
//!
//! Retrieved chunks are matched to gold labels through a string
//! convention: the source file name with a known extension suffix
//! (`.pdf`/`.md`/`.txt`/`.csv`) stripped, plus `_chunk<index>`. The
//! convention is fragile on purpose — it mirrors how benchmark labels are
//! authored — so any drift between ingestion ids and labels shows up as
//! undercounted recall rather than an error. Per-case gold and retrieved
//! ids are emitted at debug level to make such drift visible.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::models::{BenchmarkCase, DocumentChunk};
use crate::retriever::Retriever;

/// Macro-averaged retrieval scores.
#[derive(Debug, Clone, Default)]
pub struct RetrievalMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Load benchmark cases from a JSON array file.
pub fn load_benchmark(path: &Path) -> Result<Vec<BenchmarkCase>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read benchmark file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse benchmark file: {}", path.display()))
}

/// Convert a retrieved chunk to its gold-comparable identifier.
pub fn comparable_id(chunk: &DocumentChunk) -> String {
    let file_name = Path::new(&chunk.source_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| chunk.source_path.clone());

    let mut stem = file_name.as_str();
    for ext in [".pdf", ".md", ".txt", ".csv"] {
        if let Some(stripped) = stem.strip_suffix(ext) {
            stem = stripped;
            break;
        }
    }

    format!("{}_chunk{}", stem, chunk.chunk_index)
}

/// Fraction of cases whose top-k retrieval contains at least one gold id.
pub async fn recall_at_k(
    retriever: &Retriever,
    benchmark: &[BenchmarkCase],
    k: usize,
) -> Result<f64> {
    if benchmark.is_empty() {
        return Ok(0.0);
    }

    let mut hits = 0usize;
    for case in benchmark {
        let retrieved = retrieved_ids(retriever, &case.question, k).await?;
        debug!(
            question = %case.question,
            gold = ?case.gold_ids,
            retrieved = ?retrieved,
            "recall@k case"
        );
        if case.gold_ids.iter().any(|g| retrieved.contains(g)) {
            hits += 1;
        }
    }

    Ok(hits as f64 / benchmark.len() as f64)
}

/// Macro-averaged precision, recall, and F1 over the benchmark.
///
/// Per case: `precision = |gold ∩ retrieved| / k`,
/// `recall = |gold ∩ retrieved| / |gold|`, F1 the harmonic mean (0 when
/// both components are 0).
pub async fn precision_recall_f1_at_k(
    retriever: &Retriever,
    benchmark: &[BenchmarkCase],
    k: usize,
) -> Result<RetrievalMetrics> {
    if benchmark.is_empty() {
        return Ok(RetrievalMetrics::default());
    }

    let mut sum = RetrievalMetrics::default();
    for case in benchmark {
        let retrieved = retrieved_ids(retriever, &case.question, k).await?;
        debug!(
            question = %case.question,
            gold = ?case.gold_ids,
            retrieved = ?retrieved,
            "precision/recall case"
        );
        let m = case_metrics(&case.gold_ids, &retrieved, k);
        sum.precision += m.precision;
        sum.recall += m.recall;
        sum.f1 += m.f1;
    }

    let n = benchmark.len() as f64;
    Ok(RetrievalMetrics {
        precision: sum.precision / n,
        recall: sum.recall / n,
        f1: sum.f1 / n,
    })
}

async fn retrieved_ids(retriever: &Retriever, question: &str, k: usize) -> Result<Vec<String>> {
    let results = retriever.query(question, k, None).await?;
    Ok(results.iter().map(|(chunk, _)| comparable_id(chunk)).collect())
}

fn case_metrics(gold_ids: &[String], retrieved: &[String], k: usize) -> RetrievalMetrics {
    let intersection = retrieved.iter().filter(|id| gold_ids.contains(*id)).count() as f64;

    let precision = if k > 0 { intersection / k as f64 } else { 0.0 };
    let recall = if gold_ids.is_empty() {
        0.0
    } else {
        intersection / gold_ids.len() as f64
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    RetrievalMetrics { precision, recall, f1 }
}
