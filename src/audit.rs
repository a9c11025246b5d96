//! Append-only audit log of query/answer cycles.
//!
//! Every completed query writes one [`LogEntry`] into two synchronized
//! artifacts: `queries.json` (a JSON array) and `queries.csv` (a tabular
//! mirror with fixed column order). Both always hold the same entries in
//! the same order.
//!
//! If either artifact is missing or unreadable when a new entry arrives,
//! the logger resets **both** to empty and starts fresh so they stay in
//! lockstep. That recovery discards whatever was logged before — it is
//! reported as a loud data-loss warning, never as silent success.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::models::LogEntry;

const JSON_FILE: &str = "queries.json";
const CSV_FILE: &str = "queries.csv";

const CSV_HEADER: [&str; 6] = [
    "group_id",
    "timestamp",
    "question",
    "retrieved_ids",
    "prompt",
    "generated_answer",
];

/// Durable record of every query/answer cycle.
pub struct AuditLogger {
    json_path: PathBuf,
    csv_path: PathBuf,
    group_id: String,
    /// Last timestamp handed out; timestamps never go backwards even if the
    /// system clock does.
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl AuditLogger {
    pub fn new(dir: &Path, group_id: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log dir {}", dir.display()))?;

        let logger = Self {
            json_path: dir.join(JSON_FILE),
            csv_path: dir.join(CSV_FILE),
            group_id: group_id.to_string(),
            last_timestamp: Mutex::new(None),
        };

        if !logger.json_path.exists() {
            std::fs::write(&logger.json_path, "[]")?;
        }
        if !logger.csv_path.exists() {
            logger.write_csv_header()?;
        }

        Ok(logger)
    }

    /// Append one entry to both artifacts.
    pub fn log(
        &self,
        question: &str,
        retrieved_ids: &[String],
        prompt: &str,
        answer: &str,
    ) -> Result<()> {
        let entry = LogEntry {
            group_id: self.group_id.clone(),
            timestamp: self.next_timestamp()?,
            question: question.to_string(),
            retrieved_ids: retrieved_ids.to_vec(),
            prompt: prompt.to_string(),
            generated_answer: answer.to_string(),
        };

        let mut entries = self.load_or_reset()?;
        entries.push(entry.clone());

        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&self.json_path, json)
            .with_context(|| format!("Failed to write {}", self.json_path.display()))?;

        let file = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Failed to open {}", self.csv_path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        let ids_json = serde_json::to_string(&entry.retrieved_ids)?;
        writer.write_record([
            entry.group_id.as_str(),
            entry.timestamp.as_str(),
            entry.question.as_str(),
            ids_json.as_str(),
            entry.prompt.as_str(),
            entry.generated_answer.as_str(),
        ])?;
        writer.flush()?;

        Ok(())
    }

    /// All logged entries, oldest first.
    pub fn entries(&self) -> Result<Vec<LogEntry>> {
        let raw = std::fs::read_to_string(&self.json_path)
            .with_context(|| format!("Failed to read {}", self.json_path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", self.json_path.display()))
    }

    /// Load the prior entries, or reset both artifacts if either is gone or
    /// unreadable. Resetting discards all prior entries.
    fn load_or_reset(&self) -> Result<Vec<LogEntry>> {
        let parsed: Option<Vec<LogEntry>> = std::fs::read_to_string(&self.json_path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok());

        match parsed {
            Some(entries) if self.csv_path.exists() => Ok(entries),
            Some(entries) => {
                warn!(
                    discarded = entries.len(),
                    "audit CSV mirror is missing; resetting both logs to keep them in \
                     lockstep — prior entries are lost"
                );
                self.reset()?;
                Ok(Vec::new())
            }
            None => {
                warn!(
                    path = %self.json_path.display(),
                    "audit log is missing or corrupt; resetting to an empty log — \
                     prior entries are lost"
                );
                self.reset()?;
                Ok(Vec::new())
            }
        }
    }

    fn reset(&self) -> Result<()> {
        std::fs::write(&self.json_path, "[]")?;
        self.write_csv_header()?;
        Ok(())
    }

    fn write_csv_header(&self) -> Result<()> {
        let file = std::fs::File::create(&self.csv_path)
            .with_context(|| format!("Failed to create {}", self.csv_path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;
        Ok(())
    }

    /// UTC now, clamped so successive entries never move backwards.
    fn next_timestamp(&self) -> Result<String> {
        let mut last = self
            .last_timestamp
            .lock()
            .map_err(|_| anyhow::anyhow!("audit timestamp lock poisoned"))?;

        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now < prev {
                now = prev;
            }
        }
        *last = Some(now);

        Ok(now.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn csv_data_rows(path: &Path) -> Vec<csv::StringRecord> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader.records().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn two_logs_produce_two_entries_in_both_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(tmp.path(), "test-group").unwrap();

        logger
            .log("first?", &ids(&["a.txt_chunk0"]), "p1", "answer one")
            .unwrap();
        logger
            .log("second?", &ids(&["b.txt_chunk0", "b.txt_chunk1"]), "p2", "answer two")
            .unwrap();

        let entries = logger.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].question, "first?");
        assert_eq!(entries[1].question, "second?");
        assert_eq!(entries[1].retrieved_ids.len(), 2);

        let rows = csv_data_rows(&tmp.path().join(CSV_FILE));
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][2], "first?");
        assert_eq!(&rows[1][2], "second?");
        assert_eq!(&rows[0][0], "test-group");
    }

    #[test]
    fn timestamps_never_decrease() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(tmp.path(), "g").unwrap();

        logger.log("q1", &ids(&[]), "p", "a").unwrap();
        logger.log("q2", &ids(&[]), "p", "a").unwrap();

        let entries = logger.entries().unwrap();
        // RFC 3339 UTC at fixed precision: string order == time order.
        assert!(entries[0].timestamp <= entries[1].timestamp);
    }

    #[test]
    fn corrupt_json_resets_both_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(tmp.path(), "g").unwrap();
        logger.log("before", &ids(&[]), "p", "a").unwrap();

        std::fs::write(tmp.path().join(JSON_FILE), "{ not json").unwrap();

        logger.log("after", &ids(&[]), "p", "a").unwrap();

        let entries = logger.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].question, "after");

        let rows = csv_data_rows(&tmp.path().join(CSV_FILE));
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][2], "after");
    }

    #[test]
    fn missing_csv_resets_both_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(tmp.path(), "g").unwrap();
        logger.log("before", &ids(&[]), "p", "a").unwrap();

        std::fs::remove_file(tmp.path().join(CSV_FILE)).unwrap();

        logger.log("after", &ids(&[]), "p", "a").unwrap();

        assert_eq!(logger.entries().unwrap().len(), 1);
        assert_eq!(csv_data_rows(&tmp.path().join(CSV_FILE)).len(), 1);
    }

    #[test]
    fn fields_survive_json_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = AuditLogger::new(tmp.path(), "team").unwrap();
        logger
            .log("q", &ids(&["x.pdf_chunk3"]), "the prompt", "the answer")
            .unwrap();

        let entry = &logger.entries().unwrap()[0];
        assert_eq!(entry.group_id, "team");
        assert_eq!(entry.retrieved_ids, ids(&["x.pdf_chunk3"]));
        assert_eq!(entry.prompt, "the prompt");
        assert_eq!(entry.generated_answer, "the answer");
    }
}
