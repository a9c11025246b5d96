//! Overlapping word-window text chunker.
//!
//! Splits extracted document text into fixed-size windows of
//! whitespace-delimited words. Consecutive windows share `overlap` words so
//! that a sentence straddling a boundary stays retrievable; the window
//! advances by `size - overlap`, which is why `overlap >= size` is rejected
//! up front instead of looping forever.
//!
//! Each chunk receives a stable id derived from the source file name and its
//! position: `<file name>_chunk<index>`.

use anyhow::{bail, Result};

use crate::models::{DocumentChunk, SourceType};

/// Split text into overlapping windows of `size` words.
///
/// The last window may be shorter. Empty input produces zero chunks.
pub fn chunk_words(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    if size == 0 {
        bail!("chunk size must be > 0");
    }
    if overlap >= size {
        bail!("chunk overlap ({}) must be < chunk size ({})", overlap, size);
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Chunk one extracted document into [`DocumentChunk`]s with sequential ids.
///
/// `file_name` is the source file name including its extension; it is the
/// stable half of every chunk id.
pub fn chunk_document(
    source_path: &str,
    file_name: &str,
    source_type: SourceType,
    date: &str,
    text: &str,
    size: usize,
    overlap: usize,
) -> Result<Vec<DocumentChunk>> {
    let windows = chunk_words(text, size, overlap)?;

    Ok(windows
        .into_iter()
        .enumerate()
        .map(|(i, text)| DocumentChunk {
            id: format!("{}_chunk{}", file_name, i),
            source_path: source_path.to_string(),
            source_type,
            date: date.to_string(),
            chunk_index: i,
            text,
        })
        .collect())
}
