//! # DRM Module
//!
//! Ties the container, key search and record decryption together. A
//! [`MobiBook`] borrows the input bytes, and [`MobiBook::unlock`] produces a
//! DRM-free copy of identical length.

pub mod key_search;
pub mod records;

use tracing::{info, warn};

use crate::error::{CryptoType, DrmError, DrmResult};
use crate::mobi::exth::EXTH_UPDATED_TITLE;
use crate::mobi::header::decode_text;
use crate::mobi::{ExthBlock, MobiHeader, SectionTable, pdb_name};
use crate::pid::Pid;

pub use key_search::{ContentKey, KEYVEC1, find_default_key, find_key};
pub use records::{RecordStats, clear_drm, decrypt_records, trailing_size};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookKind {
    PrintReplica,
    Kf8,
    Mobipocket(u32),
}

impl BookKind {
    fn detect(version: u32, print_replica: bool) -> Self {
        if print_replica {
            BookKind::PrintReplica
        } else if version >= 8 {
            BookKind::Kf8
        } else {
            BookKind::Mobipocket(version)
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            BookKind::PrintReplica => "azw4",
            BookKind::Kf8 => "azw3",
            BookKind::Mobipocket(_) => "mobi",
        }
    }

    pub fn label(self) -> String {
        match self {
            BookKind::PrintReplica => "Print Replica".to_string(),
            BookKind::Kf8 => "Kindle Format 8".to_string(),
            BookKind::Mobipocket(v) => format!("Mobipocket {v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnlockOptions {
    /// Lift EXTH reader restrictions (clipping, TTS, rental, watermark).
    pub sanitize_exth: bool,
}

#[derive(Debug, Clone)]
pub struct UnlockedBook {
    pub data: Vec<u8>,
    /// Checksummed PID that unlocked the book; `None` for default encryption.
    pub pid: Option<String>,
    pub kind: BookKind,
    pub title: String,
    pub stats: RecordStats,
    pub rental_expiry: Option<u64>,
}

/// A parsed book, borrowing the raw file bytes.
#[derive(Debug)]
pub struct MobiBook<'a> {
    raw: &'a [u8],
    table: SectionTable,
    header: MobiHeader,
    exth: ExthBlock,
}

impl<'a> MobiBook<'a> {
    pub fn open(raw: &'a [u8]) -> DrmResult<Self> {
        let table = SectionTable::parse(raw)?;
        let section0 = table.load_section(raw, 0)?;
        let header = MobiHeader::parse(section0)?;
        let exth = if header.has_exth() {
            ExthBlock::parse(section0, header.exth_offset())
        } else {
            ExthBlock::default()
        };
        Ok(Self {
            raw,
            table,
            header,
            exth,
        })
    }

    pub fn table(&self) -> &SectionTable {
        &self.table
    }

    pub fn header(&self) -> &MobiHeader {
        &self.header
    }

    pub fn exth(&self) -> &ExthBlock {
        &self.exth
    }

    pub fn crypto_type(&self) -> CryptoType {
        self.header.crypto_type
    }

    fn section0(&self) -> DrmResult<&'a [u8]> {
        self.table.load_section(self.raw, 0)
    }

    pub fn title(&self) -> String {
        let codepage = self.header.codepage;
        if let Some(title) = self.exth.get(EXTH_UPDATED_TITLE) {
            return decode_text(title, codepage);
        }
        if let Some((offset, len)) = self.header.full_name {
            let start = offset as usize;
            let name = self
                .section0()
                .ok()
                .and_then(|s| s.get(start..start.saturating_add(len as usize)));
            if let Some(name) = name {
                return decode_text(name, codepage);
            }
        }
        decode_text(pdb_name(self.raw), 1252)
    }

    /// Book kind as stored; only meaningful for unencrypted books, since
    /// Print Replica detection reads record 1.
    pub fn kind(&self) -> BookKind {
        let print_replica = self
            .table
            .load_section(self.raw, 1)
            .map(|r| r.starts_with(b"%MOP"))
            .unwrap_or(false);
        BookKind::detect(self.header.version, print_replica)
    }

    fn find_content_key<S: AsRef<str>>(
        &self,
        pids: &[S],
    ) -> DrmResult<(ContentKey, Option<String>)> {
        let section0 = self.section0()?;
        let drm = self.header.drm_info()?;

        let mut attempts = 0usize;
        let mut first_rejection = None;
        for candidate in pids {
            let candidate = candidate.as_ref();
            let pid = match Pid::parse(candidate) {
                Ok(pid) => pid,
                Err(err) => {
                    warn!("skipping PID {candidate}: {err}");
                    if first_rejection.is_none() {
                        first_rejection = Some(err);
                    }
                    continue;
                }
            };
            attempts += 1;
            match key_search::find_key_for(section0, &drm, &pid) {
                Ok(key) => return Ok((key, Some(pid.with_checksum()))),
                Err(DrmError::KeyNotFound { .. }) => continue,
                Err(err) => return Err(err),
            }
        }

        match find_default_key(section0, &drm) {
            Ok(key) => Ok((key, None)),
            Err(DrmError::KeyNotFound { .. }) => match first_rejection {
                Some(err) if attempts == 0 => Err(err),
                _ => Err(DrmError::KeyNotFound { tried: attempts }),
            },
            Err(err) => Err(err),
        }
    }

    /// Strip DRM using the first candidate PID that opens the book.
    pub fn unlock<S: AsRef<str>>(
        &self,
        pids: &[S],
        options: &UnlockOptions,
    ) -> DrmResult<UnlockedBook> {
        let crypto_type = self.crypto_type();
        info!("crypto type is {}", crypto_type.raw());
        if crypto_type != CryptoType::Pid {
            return Err(DrmError::UnsupportedEncryption(crypto_type));
        }

        let rental_expiry = self.exth.rental_expiry();
        if let Some(expiry) = rental_expiry {
            warn!("library or rented ebook ({expiry}); continuing");
        }

        let (key, pid) = self.find_content_key(pids)?;
        match &pid {
            Some(pid) => info!("book is encoded with PID {pid}"),
            None => info!("book has default encryption, no specific key needed"),
        }

        let drm = self.header.drm_info()?;
        let mut data = self.raw.to_vec();
        if options.sanitize_exth {
            for patch in self.exth.restriction_patches() {
                self.table
                    .patch_section(&mut data, 0, &patch.bytes, patch.offset)?;
            }
        }
        clear_drm(&mut data, &self.table, &drm)?;
        let stats = decrypt_records(&mut data, &self.table, &self.header, &key)?;

        let kind = BookKind::detect(self.header.version, stats.print_replica);
        info!(
            "decrypted {} records ({} payload bytes) as {}",
            stats.records,
            stats.payload_bytes,
            kind.label()
        );

        Ok(UnlockedBook {
            data,
            pid,
            kind,
            title: self.title(),
            stats,
            rental_expiry,
        })
    }
}

/// Remove PID-based DRM from a whole MOBI file.
pub fn decrypt_mobi<S: AsRef<str>>(raw: &[u8], pids: &[S]) -> DrmResult<Vec<u8>> {
    let book = MobiBook::open(raw)?;
    Ok(book.unlock(pids, &UnlockOptions::default())?.data)
}
