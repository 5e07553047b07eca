use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::report::{BookRecord, ReportError, ReportSink, RunSummary};

pub const BOOKS_FILE: &str = "books.csv";
pub const SUMMARY_FILE: &str = "run_summary.csv";

pub struct CsvSink {
    tool_version: String,
    config_hash: String,
    books_writer: Mutex<csv::Writer<File>>,
    run_writer: Mutex<csv::Writer<File>>,
}

#[derive(Serialize)]
struct BookCsv<'a> {
    run_id: &'a str,
    input_path: &'a str,
    output_path: Option<&'a str>,
    status: &'a str,
    error_kind: Option<&'a str>,
    error: Option<&'a str>,
    pid: Option<&'a str>,
    crypto_type: Option<u16>,
    book_kind: Option<&'a str>,
    title: Option<&'a str>,
    records_decrypted: u64,
    trailing_bytes: u64,
    size: u64,
    md5: Option<&'a str>,
    sha256: Option<&'a str>,
    tool_version: &'a str,
    config_hash: &'a str,
}

#[derive(Serialize)]
struct RunSummaryCsv<'a> {
    run_id: &'a str,
    books_total: u64,
    decrypted: u64,
    not_encrypted: u64,
    skipped: u64,
    failed: u64,
    cancelled: u64,
    tool_version: &'a str,
    config_hash: &'a str,
}

impl CsvSink {
    pub fn new(
        tool_version: &str,
        config_hash: &str,
        run_output_dir: &Path,
    ) -> Result<Self, ReportError> {
        let report_dir = run_output_dir.join("report");
        std::fs::create_dir_all(&report_dir)?;

        let books_file = File::create(report_dir.join(BOOKS_FILE))?;
        let run_file = File::create(report_dir.join(SUMMARY_FILE))?;

        Ok(Self {
            tool_version: tool_version.to_string(),
            config_hash: config_hash.to_string(),
            books_writer: Mutex::new(csv::Writer::from_writer(books_file)),
            run_writer: Mutex::new(csv::Writer::from_writer(run_file)),
        })
    }
}

impl ReportSink for CsvSink {
    fn record_book(&self, record: &BookRecord) -> Result<(), ReportError> {
        let row = BookCsv {
            run_id: &record.run_id,
            input_path: &record.input_path,
            output_path: record.output_path.as_deref(),
            status: record.status.as_str(),
            error_kind: record.error_kind.as_deref(),
            error: record.error.as_deref(),
            pid: record.pid.as_deref(),
            crypto_type: record.crypto_type,
            book_kind: record.book_kind.as_deref(),
            title: record.title.as_deref(),
            records_decrypted: record.records_decrypted,
            trailing_bytes: record.trailing_bytes,
            size: record.size,
            md5: record.md5.as_deref(),
            sha256: record.sha256.as_deref(),
            tool_version: &self.tool_version,
            config_hash: &self.config_hash,
        };
        let mut guard = self.books_writer.lock().unwrap_or_else(|e| e.into_inner());
        guard.serialize(row)?;
        Ok(())
    }

    fn record_run_summary(&self, summary: &RunSummary) -> Result<(), ReportError> {
        let row = RunSummaryCsv {
            run_id: &summary.run_id,
            books_total: summary.books_total,
            decrypted: summary.decrypted,
            not_encrypted: summary.not_encrypted,
            skipped: summary.skipped,
            failed: summary.failed,
            cancelled: summary.cancelled,
            tool_version: &self.tool_version,
            config_hash: &self.config_hash,
        };
        let mut guard = self.run_writer.lock().unwrap_or_else(|e| e.into_inner());
        guard.serialize(row)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), ReportError> {
        self.books_writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .flush()?;
        self.run_writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .flush()?;
        Ok(())
    }
}
