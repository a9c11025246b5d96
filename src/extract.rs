//! Per-format text extraction for ingestible documents.
//!
//! Turns a source file into plain UTF-8 text. Plaintext and markdown are
//! read verbatim; PDF goes through `pdf-extract`; CSV is rendered as one
//! comma-joined line per row, header first, with malformed rows skipped.
//!
//! Extraction failure is never fatal to an index build: callers use
//! [`extract_text_lenient`], which degrades a failed file to an empty
//! string so it drops out of chunking instead of aborting ingestion.

use std::path::Path;

use tracing::warn;

use crate::models::SourceType;

/// Extraction error. The pipeline downgrades these to empty text per file.
#[derive(Debug)]
pub enum ExtractError {
    Io(String),
    Pdf(String),
    Csv(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io(e) => write!(f, "read failed: {}", e),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Csv(e) => write!(f, "CSV extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract plain text from a source file of known type.
pub fn extract_text(path: &Path, source_type: SourceType) -> Result<String, ExtractError> {
    match source_type {
        SourceType::Text | SourceType::Markdown => {
            std::fs::read_to_string(path).map_err(|e| ExtractError::Io(e.to_string()))
        }
        SourceType::Pdf => extract_pdf(path),
        SourceType::Csv => extract_csv(path),
    }
}

/// Extract text, mapping any failure to an empty string.
///
/// The file is effectively excluded downstream: empty text chunks to
/// nothing. The failure is logged, not propagated.
pub fn extract_text_lenient(path: &Path, source_type: SourceType) -> String {
    match extract_text(path, source_type) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), "extraction failed, skipping file: {}", e);
            String::new()
        }
    }
}

fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    pdf_extract::extract_text(path).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Render a CSV file as text: the header row, then each data row, each as a
/// single comma-joined line in file order. Rows the parser rejects are
/// skipped with a warning.
fn extract_csv(path: &Path) -> Result<String, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| ExtractError::Csv(e.to_string()))?;

    let mut lines: Vec<String> = Vec::new();

    let headers = reader
        .headers()
        .map_err(|e| ExtractError::Csv(e.to_string()))?;
    if !headers.is_empty() {
        lines.push(headers.iter().collect::<Vec<_>>().join(","));
    }

    for record in reader.records() {
        match record {
            Ok(row) => lines.push(row.iter().collect::<Vec<_>>().join(",")),
            Err(e) => {
                warn!(path = %path.display(), "skipping malformed CSV row: {}", e);
            }
        }
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plaintext_read_verbatim() {
        let mut f = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        f.write_all(b"hello world\nsecond line").unwrap();
        let text = extract_text(f.path(), SourceType::Text).unwrap();
        assert_eq!(text, "hello world\nsecond line");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = extract_text(Path::new("/nonexistent/x.txt"), SourceType::Text).unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }

    #[test]
    fn invalid_pdf_is_a_pdf_error() {
        let mut f = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        f.write_all(b"not a pdf at all").unwrap();
        let err = extract_text(f.path(), SourceType::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn csv_renders_header_and_rows_in_order() {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(b"country,capital\nFrance,Paris\nJapan,Tokyo\n")
            .unwrap();
        let text = extract_text(f.path(), SourceType::Csv).unwrap();
        assert_eq!(text, "country,capital\nFrance,Paris\nJapan,Tokyo");
    }

    #[test]
    fn csv_tolerates_uneven_rows() {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(b"a,b\n1,2\n3\n4,5,6\n").unwrap();
        let text = extract_text(f.path(), SourceType::Csv).unwrap();
        assert!(text.contains("1,2"));
        assert!(text.contains("3"));
        assert!(text.contains("4,5,6"));
    }

    #[test]
    fn lenient_extraction_maps_failure_to_empty() {
        let text = extract_text_lenient(Path::new("/nonexistent/x.txt"), SourceType::Text);
        assert!(text.is_empty());
    }
}
