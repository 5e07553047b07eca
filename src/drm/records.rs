//! Text record decryption and DRM header clearing.

use tracing::debug;

use crate::crypto::{CipherMode, pc1_in_place};
use crate::error::{DrmError, DrmResult};
use crate::mobi::header::{DRM_FIELDS_LEN, OFF_CRYPTO_TYPE, OFF_DRM_FIELDS};
use crate::mobi::{DrmInfo, MobiHeader, SectionTable};

use super::key_search::ContentKey;

const PRINT_REPLICA_MAGIC: &[u8; 4] = b"%MOP";
const PROGRESS_EVERY: usize = 100;
const MAX_ENTRY_BITS: u32 = 28;

fn corrupt(reason: impl Into<String>) -> DrmError {
    DrmError::CorruptRecord {
        record: 0,
        reason: reason.into(),
    }
}

/// One backward-encoded trailing entry size ending at `data[..size]`.
fn trailing_entry_size(data: &[u8], mut size: usize) -> usize {
    let mut bitpos = 0u32;
    let mut result = 0usize;
    while size > 0 {
        let v = data[size - 1];
        result |= ((v & 0x7F) as usize) << bitpos;
        bitpos += 7;
        size -= 1;
        if v & 0x80 != 0 || bitpos >= MAX_ENTRY_BITS {
            break;
        }
    }
    result
}

/// Bytes at the end of `record` that are not part of the encrypted payload.
///
/// Bits 1.. of `flags` each mark a variable-length entry; bit 0 marks the
/// multibyte entry, which sits innermost and is sized last.
pub fn trailing_size(record: &[u8], flags: u16) -> DrmResult<usize> {
    let len = record.len();
    let mut num = 0usize;
    let mut testflags = flags >> 1;
    while testflags != 0 {
        if testflags & 1 != 0 {
            num += trailing_entry_size(record, len - num);
            if num > len {
                return Err(corrupt(format!(
                    "trailing entries claim {num} bytes of a {len}-byte record"
                )));
            }
        }
        testflags >>= 1;
    }
    if flags & 1 != 0 {
        if num >= len {
            return Err(corrupt("no room for multibyte trailing entry"));
        }
        num += (record[len - num - 1] & 0x3) as usize + 1;
        if num > len {
            return Err(corrupt(format!(
                "multibyte entry overruns a {len}-byte record"
            )));
        }
    }
    Ok(num)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordStats {
    pub records: usize,
    pub payload_bytes: usize,
    pub trailing_bytes: usize,
    pub print_replica: bool,
}

/// Decrypt records `1..=header.records` in place, leaving trailing entries
/// untouched.
pub fn decrypt_records(
    buf: &mut [u8],
    table: &SectionTable,
    header: &MobiHeader,
    key: &ContentKey,
) -> DrmResult<RecordStats> {
    let count = header.records as usize;
    if count >= table.len() {
        return Err(DrmError::CorruptRecord {
            record: count,
            reason: format!("header lists {count} records but the file has {}", table.len()),
        });
    }

    let mut stats = RecordStats::default();
    for index in 1..=count {
        let range = table.range(index)?;
        let record = buf
            .get_mut(range)
            .ok_or_else(|| DrmError::invalid(format!("record {index} past end of buffer")))?;
        let trail = trailing_size(record, header.extra_data_flags).map_err(|err| match err {
            DrmError::CorruptRecord { reason, .. } => DrmError::CorruptRecord {
                record: index,
                reason,
            },
            other => other,
        })?;
        let payload_len = record.len() - trail;
        pc1_in_place(key.as_bytes(), &mut record[..payload_len], CipherMode::Decrypt)?;

        if index == 1 {
            stats.print_replica = record.starts_with(PRINT_REPLICA_MAGIC);
        }
        stats.records += 1;
        stats.payload_bytes += payload_len;
        stats.trailing_bytes += trail;
        if index % PROGRESS_EVERY == 0 {
            debug!("decrypted {index}/{count} records");
        }
    }
    Ok(stats)
}

/// Zero the key table and DRM words and mark the book unencrypted.
pub fn clear_drm(buf: &mut [u8], table: &SectionTable, drm: &DrmInfo) -> DrmResult<()> {
    let zeros = vec![0u8; drm.size as usize];
    table.patch_section(buf, 0, &zeros, drm.ptr as usize)?;

    let mut words = [0u8; DRM_FIELDS_LEN];
    words[..4].copy_from_slice(&[0xFF; 4]);
    table.patch_section(buf, 0, &words, OFF_DRM_FIELDS)?;

    table.patch_section(buf, 0, &[0, 0], OFF_CRYPTO_TYPE)
}
