use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::report::{BookRecord, ReportError, ReportSink, RunSummary};

pub const BOOKS_FILE: &str = "books.jsonl";

pub struct JsonlSink {
    tool_version: String,
    config_hash: String,
    writer: Mutex<BufWriter<File>>,
}

#[derive(Serialize)]
struct BookLine<'a> {
    record_type: &'static str,
    #[serde(flatten)]
    book: &'a BookRecord,
    tool_version: &'a str,
    config_hash: &'a str,
}

#[derive(Serialize)]
struct SummaryLine<'a> {
    record_type: &'static str,
    #[serde(flatten)]
    summary: &'a RunSummary,
    tool_version: &'a str,
    config_hash: &'a str,
}

impl JsonlSink {
    pub fn new(
        tool_version: &str,
        config_hash: &str,
        run_output_dir: &Path,
    ) -> Result<Self, ReportError> {
        let report_dir = run_output_dir.join("report");
        std::fs::create_dir_all(&report_dir)?;
        let file = File::create(report_dir.join(BOOKS_FILE))?;
        Ok(Self {
            tool_version: tool_version.to_string(),
            config_hash: config_hash.to_string(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write_line<T: Serialize>(&self, value: &T) -> Result<(), ReportError> {
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        serde_json::to_writer(&mut *guard, value)?;
        guard.write_all(b"\n")?;
        Ok(())
    }
}

impl ReportSink for JsonlSink {
    fn record_book(&self, record: &BookRecord) -> Result<(), ReportError> {
        self.write_line(&BookLine {
            record_type: "book",
            book: record,
            tool_version: &self.tool_version,
            config_hash: &self.config_hash,
        })
    }

    fn record_run_summary(&self, summary: &RunSummary) -> Result<(), ReportError> {
        self.write_line(&SummaryLine {
            record_type: "run_summary",
            summary,
            tool_version: &self.tool_version,
            config_hash: &self.config_hash,
        })
    }

    fn flush(&self) -> Result<(), ReportError> {
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        guard.flush()?;
        Ok(())
    }
}
