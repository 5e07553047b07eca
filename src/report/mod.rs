//! # Report Module
//!
//! Per-book outcome records and run summaries, written as JSONL or CSV
//! under `<output>/report/`.

pub mod csv;
pub mod jsonl;

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    Decrypted,
    NotEncrypted,
    Skipped,
    Failed,
    Cancelled,
}

impl BookStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookStatus::Decrypted => "decrypted",
            BookStatus::NotEncrypted => "not_encrypted",
            BookStatus::Skipped => "skipped",
            BookStatus::Failed => "failed",
            BookStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookRecord {
    pub run_id: String,
    pub input_path: String,
    pub output_path: Option<String>,
    pub status: BookStatus,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub pid: Option<String>,
    pub crypto_type: Option<u16>,
    pub book_kind: Option<String>,
    pub title: Option<String>,
    pub records_decrypted: u64,
    /// Bytes of trailing entries left unencrypted across all records.
    pub trailing_bytes: u64,
    pub size: u64,
    pub md5: Option<String>,
    pub sha256: Option<String>,
}

impl BookRecord {
    pub fn new(run_id: &str, input_path: &Path, status: BookStatus) -> Self {
        Self {
            run_id: run_id.to_string(),
            input_path: input_path.to_string_lossy().to_string(),
            output_path: None,
            status,
            error_kind: None,
            error: None,
            pid: None,
            crypto_type: None,
            book_kind: None,
            title: None,
            records_decrypted: 0,
            trailing_bytes: 0,
            size: 0,
            md5: None,
            sha256: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub books_total: u64,
    pub decrypted: u64,
    pub not_encrypted: u64,
    pub skipped: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl RunSummary {
    pub fn count(&mut self, status: BookStatus) {
        self.books_total += 1;
        match status {
            BookStatus::Decrypted => self.decrypted += 1,
            BookStatus::NotEncrypted => self.not_encrypted += 1,
            BookStatus::Skipped => self.skipped += 1,
            BookStatus::Failed => self.failed += 1,
            BookStatus::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ReportBackendKind {
    Jsonl,
    Csv,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Report output sink.
///
/// # Example
/// ```rust
/// use mobistrip::report::{self, BookRecord, BookStatus, ReportBackendKind};
/// use std::path::Path;
///
/// let out = std::env::temp_dir().join("mobistrip_report_example");
/// std::fs::create_dir_all(&out).unwrap();
/// let sink = report::build_sink(ReportBackendKind::Jsonl, "0.1.0", "hash", &out).unwrap();
/// sink.record_book(&BookRecord::new("run", Path::new("a.azw"), BookStatus::Skipped)).unwrap();
/// sink.flush().unwrap();
/// ```
pub trait ReportSink: Send + Sync {
    fn record_book(&self, record: &BookRecord) -> Result<(), ReportError>;
    fn record_run_summary(&self, summary: &RunSummary) -> Result<(), ReportError>;
    fn flush(&self) -> Result<(), ReportError>;
}

pub fn build_sink(
    backend: ReportBackendKind,
    tool_version: &str,
    config_hash: &str,
    run_output_dir: &Path,
) -> Result<Box<dyn ReportSink>, ReportError> {
    match backend {
        ReportBackendKind::Jsonl => Ok(Box::new(jsonl::JsonlSink::new(
            tool_version,
            config_hash,
            run_output_dir,
        )?)),
        ReportBackendKind::Csv => Ok(Box::new(csv::CsvSink::new(
            tool_version,
            config_hash,
            run_output_dir,
        )?)),
    }
}
