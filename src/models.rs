//! Core data models used throughout corpus-qa.
//!
//! These types represent the chunks, filters, conversation turns, and log
//! records that flow through the retrieval and answer pipeline.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Kind of source file a chunk was extracted from.
///
/// Derived from the file extension at ingestion time. Files with any other
/// extension are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    #[serde(rename = "txt")]
    Text,
    #[serde(rename = "md")]
    Markdown,
    #[serde(rename = "pdf")]
    Pdf,
    #[serde(rename = "csv")]
    Csv,
}

impl SourceType {
    /// Map a path's extension to a source type. `None` means "not ingestible".
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(SourceType::Text),
            "md" => Some(SourceType::Markdown),
            "pdf" => Some(SourceType::Pdf),
            "csv" => Some(SourceType::Csv),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Text => "txt",
            SourceType::Markdown => "md",
            SourceType::Pdf => "pdf",
            SourceType::Csv => "csv",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "txt" => Ok(SourceType::Text),
            "md" => Ok(SourceType::Markdown),
            "pdf" => Ok(SourceType::Pdf),
            "csv" => Ok(SourceType::Csv),
            other => Err(format!(
                "unknown source type '{}' (expected txt, md, pdf, or csv)",
                other
            )),
        }
    }
}

/// A bounded window of a document's text, the atomic retrieval unit.
///
/// Immutable once created. The id is stable across rebuilds of the same
/// file: `<file name incl. extension>_chunk<index>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub source_path: String,
    pub source_type: SourceType,
    /// ISO `YYYY-MM-DD` date from the filename or file mtime, else `"unknown"`.
    pub date: String,
    pub chunk_index: usize,
    pub text: String,
}

/// One completed (question, answer) exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

/// Conjunctive metadata predicates applied to retrieved chunks.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Keep only chunks of this source type.
    pub source_type: Option<SourceType>,
    /// Keep only chunks whose date string compares lexicographically greater.
    /// Chunks with date `"unknown"` compare greater than any ISO date and
    /// therefore pass this predicate.
    pub date_after: Option<String>,
}

impl QueryFilter {
    /// True when every set predicate accepts the chunk.
    pub fn matches(&self, chunk: &DocumentChunk) -> bool {
        if let Some(st) = self.source_type {
            if chunk.source_type != st {
                return false;
            }
        }
        if let Some(ref after) = self.date_after {
            if chunk.date.as_str() <= after.as_str() {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.source_type.is_none() && self.date_after.is_none()
    }
}

/// One audit record per completed query/answer cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub group_id: String,
    /// UTC, RFC 3339. Non-decreasing across calls within one logger.
    pub timestamp: String,
    pub question: String,
    pub retrieved_ids: Vec<String>,
    pub prompt: String,
    pub generated_answer: String,
}

/// A labeled retrieval-quality case: a question plus the chunk ids that
/// count as correct retrievals for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkCase {
    pub question: String,
    pub gold_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn chunk(source_type: SourceType, date: &str) -> DocumentChunk {
        DocumentChunk {
            id: "a.txt_chunk0".to_string(),
            source_path: "a.txt".to_string(),
            source_type,
            date: date.to_string(),
            chunk_index: 0,
            text: "text".to_string(),
        }
    }

    #[test]
    fn source_type_from_extension() {
        assert_eq!(
            SourceType::from_path(&PathBuf::from("notes.TXT")),
            Some(SourceType::Text)
        );
        assert_eq!(
            SourceType::from_path(&PathBuf::from("paper.pdf")),
            Some(SourceType::Pdf)
        );
        assert_eq!(SourceType::from_path(&PathBuf::from("image.png")), None);
        assert_eq!(SourceType::from_path(&PathBuf::from("no_extension")), None);
    }

    #[test]
    fn empty_filter_matches_everything() {
        let f = QueryFilter::default();
        assert!(f.is_empty());
        assert!(f.matches(&chunk(SourceType::Pdf, "2024-01-01")));
    }

    #[test]
    fn filter_predicates_are_conjunctive() {
        let f = QueryFilter {
            source_type: Some(SourceType::Text),
            date_after: Some("2024-06-01".to_string()),
        };
        assert!(f.matches(&chunk(SourceType::Text, "2024-07-01")));
        assert!(!f.matches(&chunk(SourceType::Pdf, "2024-07-01")));
        assert!(!f.matches(&chunk(SourceType::Text, "2024-05-01")));
    }

    #[test]
    fn unknown_date_passes_date_after() {
        let f = QueryFilter {
            source_type: None,
            date_after: Some("2024-06-01".to_string()),
        };
        assert!(f.matches(&chunk(SourceType::Text, "unknown")));
    }
}
