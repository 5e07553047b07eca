//! # Batch Module
//!
//! Decrypts many books on a worker pool. Each book is an independent job;
//! outcomes flow to a single report thread that owns the sink.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, warn};

use crate::drm::{MobiBook, UnlockOptions};
use crate::error::{CryptoType, DrmError};
use crate::report::{BookRecord, BookStatus, ReportSink, RunSummary};
use crate::util;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub run_id: String,
    pub output_dir: PathBuf,
    pub output_suffix: String,
    pub pids: Vec<String>,
    pub workers: usize,
    pub sanitize_exth: bool,
    pub overwrite: bool,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub summary: RunSummary,
    pub report_errors: u64,
}

impl BatchOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.summary.failed == 0
    }
}

/// Output paths written during one run, keyed to the input that claimed them.
#[derive(Debug, Default)]
pub struct OutputClaims {
    claimed: Mutex<HashMap<PathBuf, PathBuf>>,
}

impl OutputClaims {
    /// Claim `output` for `input`; on collision returns the earlier input.
    pub fn claim(&self, output: &Path, input: &Path) -> Result<(), PathBuf> {
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        match claimed.entry(output.to_path_buf()) {
            Entry::Occupied(owner) if owner.get().as_path() != input => Err(owner.get().clone()),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(input.to_path_buf());
                Ok(())
            }
        }
    }
}

fn spawn_report_thread(
    sink: Box<dyn ReportSink>,
    rx: Receiver<BookRecord>,
    run_id: String,
    error_count: Arc<AtomicU64>,
) -> thread::JoinHandle<RunSummary> {
    thread::spawn(move || {
        let mut summary = RunSummary {
            run_id,
            ..RunSummary::default()
        };
        for record in rx {
            summary.count(record.status);
            if let Err(err) = sink.record_book(&record) {
                error_count.fetch_add(1, Ordering::Relaxed);
                warn!("report record error: {err}");
            }
        }
        if let Err(err) = sink.record_run_summary(&summary) {
            error_count.fetch_add(1, Ordering::Relaxed);
            warn!("report record error: {err}");
        }
        if let Err(err) = sink.flush() {
            error_count.fetch_add(1, Ordering::Relaxed);
            warn!("report flush error: {err}");
        }
        summary
    })
}

/// Run every input through [`process_book`] on `opts.workers` threads.
pub fn run_batch(
    inputs: &[PathBuf],
    opts: &BatchOptions,
    sink: Box<dyn ReportSink>,
    cancel_flag: Arc<AtomicBool>,
) -> Result<BatchOutcome> {
    util::ensure_output_dir(&opts.output_dir)?;

    let worker_count = opts.workers.max(1).min(inputs.len().max(1));
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<PathBuf>();
    let (report_tx, report_rx) = crossbeam_channel::unbounded::<BookRecord>();
    let report_errors = Arc::new(AtomicU64::new(0));

    let report_handle =
        spawn_report_thread(sink, report_rx, opts.run_id.clone(), report_errors.clone());
    let handles = spawn_book_workers(
        worker_count,
        Arc::new(opts.clone()),
        job_rx,
        report_tx,
        cancel_flag,
    );

    for input in inputs {
        if let Err(err) = job_tx.send(input.clone()) {
            warn!("job channel closed while queueing books: {err}");
            break;
        }
    }
    drop(job_tx);

    for handle in handles {
        if handle.join().is_err() {
            error!("book worker panicked");
        }
    }
    let summary = report_handle
        .join()
        .map_err(|_| anyhow::anyhow!("report thread panicked"))?;

    info!(
        "batch finished: {} books, {} decrypted, {} not encrypted, {} skipped, {} failed, {} cancelled",
        summary.books_total,
        summary.decrypted,
        summary.not_encrypted,
        summary.skipped,
        summary.failed,
        summary.cancelled
    );

    Ok(BatchOutcome {
        summary,
        report_errors: report_errors.load(Ordering::Relaxed),
    })
}

fn spawn_book_workers(
    workers: usize,
    opts: Arc<BatchOptions>,
    rx: Receiver<PathBuf>,
    report_tx: Sender<BookRecord>,
    cancel_flag: Arc<AtomicBool>,
) -> Vec<thread::JoinHandle<()>> {
    let claims = Arc::new(OutputClaims::default());
    let mut handles = Vec::new();
    for _ in 0..workers {
        let opts = opts.clone();
        let claims = claims.clone();
        let rx = rx.clone();
        let report_tx = report_tx.clone();
        let cancel_flag = cancel_flag.clone();

        handles.push(thread::spawn(move || {
            for path in rx {
                let record = if cancel_flag.load(Ordering::Relaxed) {
                    BookRecord::new(&opts.run_id, &path, BookStatus::Cancelled)
                } else {
                    process_book(&path, &opts, &claims)
                };
                if let Err(err) = report_tx.send(record) {
                    warn!("report channel closed while sending book: {err}");
                    break;
                }
            }
        }));
    }
    handles
}

/// Decrypt (or copy) one book and describe the outcome.
pub fn process_book(path: &Path, opts: &BatchOptions, claims: &OutputClaims) -> BookRecord {
    let mut record = BookRecord::new(&opts.run_id, path, BookStatus::Failed);
    if let Err(err) = process_into(path, opts, claims, &mut record) {
        record.status = BookStatus::Failed;
        record.error_kind = Some(
            err.downcast_ref::<DrmError>()
                .map(DrmError::kind)
                .unwrap_or("io")
                .to_string(),
        );
        record.error = Some(format!("{err:#}"));
        error!("{}: {err:#}", path.display());
    }
    record
}

fn skip(record: &mut BookRecord, kind: &str, reason: String) {
    warn!("{}: {reason}; skipping", record.input_path);
    record.status = BookStatus::Skipped;
    record.error_kind = Some(kind.to_string());
    record.error = Some(reason);
}

fn already_exists(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::AlreadyExists)
}

fn process_into(
    path: &Path,
    opts: &BatchOptions,
    claims: &OutputClaims,
    record: &mut BookRecord,
) -> Result<()> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let book = MobiBook::open(&raw)?;
    let crypto_type = book.crypto_type();
    record.crypto_type = Some(crypto_type.raw());
    record.title = Some(book.title());
    info!("{}: {}", path.display(), book.title());

    let (data, kind, status) = if crypto_type == CryptoType::None {
        info!("{}: {crypto_type}; copying as-is", path.display());
        (None, book.kind(), BookStatus::NotEncrypted)
    } else {
        let options = UnlockOptions {
            sanitize_exth: opts.sanitize_exth,
        };
        let unlocked = book.unlock(&opts.pids, &options)?;
        record.pid = unlocked.pid.clone();
        record.records_decrypted = unlocked.stats.records as u64;
        record.trailing_bytes = unlocked.stats.trailing_bytes as u64;
        (Some(unlocked.data), unlocked.kind, BookStatus::Decrypted)
    };
    record.book_kind = Some(kind.label());

    let out_path = util::output_path(
        &opts.output_dir,
        path,
        &opts.output_suffix,
        kind.extension(),
    );
    record.output_path = Some(out_path.to_string_lossy().into_owned());
    if let Err(owner) = claims.claim(&out_path, path) {
        skip(
            record,
            "output_collision",
            format!("{} already written for {}", out_path.display(), owner.display()),
        );
        return Ok(());
    }

    let mode = if opts.overwrite {
        util::WriteMode::Overwrite
    } else {
        util::WriteMode::CreateNew
    };
    let written = match util::write_book(&out_path, data.as_deref().unwrap_or(raw.as_slice()), mode)
    {
        Ok(written) => written,
        Err(err) if already_exists(&err) => {
            skip(record, "output_exists", format!("{} exists", out_path.display()));
            return Ok(());
        }
        Err(err) => return Err(err),
    };
    record.size = written.size;
    record.md5 = Some(written.md5);
    record.sha256 = Some(written.sha256);
    record.status = status;
    info!("{} -> {}", path.display(), out_path.display());
    Ok(())
}
