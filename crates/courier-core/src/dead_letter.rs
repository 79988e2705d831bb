//! Dead-letter records for undeliverable messages.
//!
//! When a message exhausts its retry budget or the target rejects it
//! outright, the forwarder acks the queue message to stop redelivery and
//! appends a record here. The log is JSONL, append-only: one line per
//! undeliverable message, written before the event is considered handled.
//! An injectable sink keeps the forwarder testable without touching disk.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for dead-letter operations.
pub type DeadLetterResult<T> = std::result::Result<T, DeadLetterError>;

/// Errors raised while recording or reading dead letters.
#[derive(Debug, Error)]
pub enum DeadLetterError {
    #[error("dead-letter io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dead-letter encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a message left the active pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// The target rejected the message with a non-retryable status.
    Rejected { status: u16 },

    /// Every attempt in the retry budget failed transiently.
    RetriesExhausted,

    /// The queue payload could not be decoded into a message.
    Undecodable,
}

/// One undeliverable message, as persisted to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub ts: DateTime<Utc>,
    pub message_id: String,
    pub user_id: String,
    pub attempts: u32,
    pub reason: DeadLetterReason,
}

/// Destination for dead-letter records.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Persist one record. Failures are the caller's to log; they must not
    /// abort message processing.
    async fn record(&self, record: &DeadLetterRecord) -> DeadLetterResult<()>;
}

/// Append-only JSONL dead-letter log on disk.
pub struct DeadLetterLog {
    path: PathBuf,
}

impl DeadLetterLog {
    /// Create a log writing to `path`. Parent directories are created on
    /// first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in the log, oldest first.
    pub fn read_all(&self) -> DeadLetterResult<Vec<DeadLetterRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let mut records = Vec::new();
        for line in raw.lines().filter(|line| !line.trim().is_empty()) {
            records.push(serde_json::from_str(line)?);
        }
        Ok(records)
    }

    fn append(&self, record: &DeadLetterRecord) -> DeadLetterResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl DeadLetterSink for DeadLetterLog {
    async fn record(&self, record: &DeadLetterRecord) -> DeadLetterResult<()> {
        // Writes are one short line; blocking here is cheaper than a
        // spawn_blocking round-trip.
        self.append(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, reason: DeadLetterReason) -> DeadLetterRecord {
        DeadLetterRecord {
            ts: Utc::now(),
            message_id: id.to_string(),
            user_id: "u1".to_string(),
            attempts: 6,
            reason,
        }
    }

    #[tokio::test]
    async fn appends_one_line_per_record() {
        let dir = TempDir::new().unwrap();
        let log = DeadLetterLog::new(dir.path().join("dead-letters.jsonl"));

        log.record(&record("m-1", DeadLetterReason::RetriesExhausted))
            .await
            .unwrap();
        log.record(&record("m-2", DeadLetterReason::Rejected { status: 400 }))
            .await
            .unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message_id, "m-1");
        assert_eq!(records[0].reason, DeadLetterReason::RetriesExhausted);
        assert_eq!(records[1].reason, DeadLetterReason::Rejected { status: 400 });
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let log = DeadLetterLog::new(dir.path().join("nested/dir/dl.jsonl"));
        log.record(&record("m-1", DeadLetterReason::Undecodable))
            .await
            .unwrap();
        assert_eq!(log.read_all().unwrap().len(), 1);
    }

    #[test]
    fn missing_log_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let log = DeadLetterLog::new(dir.path().join("absent.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn reason_serializes_with_snake_case_tag() {
        let value =
            serde_json::to_value(DeadLetterReason::Rejected { status: 404 }).unwrap();
        assert_eq!(value["type"], "rejected");
        assert_eq!(value["status"], 404);
        let value = serde_json::to_value(DeadLetterReason::RetriesExhausted).unwrap();
        assert_eq!(value["type"], "retries_exhausted");
    }
}
