//! # Utility Module
//!
//! Output naming, output directory checks and hashed book writing.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::report::ReportBackendKind;

/// Convert CLI report backend to internal enum
pub fn backend_from_cli(backend: crate::cli::ReportBackend) -> ReportBackendKind {
    match backend {
        crate::cli::ReportBackend::Jsonl => ReportBackendKind::Jsonl,
        crate::cli::ReportBackend::Csv => ReportBackendKind::Csv,
    }
}

/// Ensure output directory exists and is writable, warning on unsafe permissions.
pub fn ensure_output_dir(path: &Path) -> Result<()> {
    if path.exists() {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_dir() {
            return Err(anyhow!(
                "output path is not a directory: {}",
                path.display()
            ));
        }
    } else {
        std::fs::create_dir_all(path)?;
    }

    let probe_path = path.join(".mobistrip_write_probe");
    match OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe_path)
    {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe_path);
        }
        Err(err) => {
            return Err(anyhow!(
                "output directory is not writable: {} ({})",
                path.display(),
                err
            ));
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(path)?.permissions().mode();
        if mode & 0o002 != 0 {
            warn!("output directory is world-writable: {}", path.display());
        }
    }

    Ok(())
}

pub fn sanitize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

/// `<dir>/<stem><suffix>.<ext>` for an input book.
pub fn output_path(dir: &Path, input: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book".to_string());
    dir.join(format!("{stem}{suffix}.{}", sanitize_extension(ext)))
}

/// Size and digests of a written book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenBook {
    pub size: u64,
    pub md5: String,
    pub sha256: String,
}

struct HashingWriter {
    written: u64,
    writer: BufWriter<File>,
    md5: md5::Context,
    sha256: Sha256,
}

impl HashingWriter {
    fn new(file: File) -> Self {
        Self {
            written: 0,
            writer: BufWriter::new(file),
            md5: md5::Context::new(),
            sha256: Sha256::new(),
        }
    }

    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(buf)?;
        self.md5.consume(buf);
        self.sha256.update(buf);
        self.written = self.written.saturating_add(buf.len() as u64);
        Ok(())
    }

    fn finish(mut self) -> std::io::Result<WrittenBook> {
        self.writer.flush()?;
        Ok(WrittenBook {
            size: self.written,
            md5: format!("{:x}", self.md5.compute()),
            sha256: hex::encode(self.sha256.finalize()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with `AlreadyExists` rather than replace a file.
    CreateNew,
    Overwrite,
}

/// Write `data` to `path`, hashing it on the way out.
pub fn write_book(path: &Path, data: &[u8], mode: WriteMode) -> Result<WrittenBook> {
    let mut options = OpenOptions::new();
    options.write(true);
    match mode {
        WriteMode::CreateNew => options.create_new(true),
        WriteMode::Overwrite => options.create(true).truncate(true),
    };
    let file = options
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = HashingWriter::new(file);
    writer
        .write_bytes(data)
        .with_context(|| format!("writing {}", path.display()))?;
    writer
        .finish()
        .with_context(|| format!("flushing {}", path.display()))
}
