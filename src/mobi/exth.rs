//! EXTH metadata block.
//!
//! Besides lookup, this knows how to lift the reader-side restrictions some
//! records carry (clipping limit, text-to-speech, rental flags, watermark).
//! Every rewrite keeps the record length unchanged.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::header::{be_u32, be_u64};

pub const EXTH_MAGIC: &[u8; 4] = b"EXTH";

pub const EXTH_WATERMARK: u32 = 208;
pub const EXTH_CLIPPING_LIMIT: u32 = 401;
pub const EXTH_TTS_DISABLED: u32 = 404;
pub const EXTH_RENTAL: u32 = 405;
pub const EXTH_RENTAL_EXPIRY: u32 = 406;
pub const EXTH_UPDATED_TITLE: u32 = 503;

const EXTH_ITEMS_START: usize = 12;
const ITEM_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExthRecord {
    pub kind: u32,
    /// Offset of the record payload relative to the start of record 0.
    pub data_offset: usize,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ExthBlock {
    records: Vec<ExthRecord>,
}

/// A length-preserving rewrite inside record 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExthPatch {
    pub kind: u32,
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl ExthBlock {
    /// Parse the EXTH block located `start` bytes into record 0. A malformed
    /// block yields whatever records were read before the damage.
    pub fn parse(section0: &[u8], start: usize) -> Self {
        let mut records = Vec::new();
        let Some(exth) = section0.get(start..) else {
            return Self { records };
        };
        if exth.len() < EXTH_ITEMS_START || &exth[..4] != EXTH_MAGIC {
            return Self { records };
        }
        let count = be_u32(exth, 8).unwrap_or(0);
        let mut pos = EXTH_ITEMS_START;
        for i in 0..count {
            let (Some(kind), Some(size)) = (be_u32(exth, pos), be_u32(exth, pos + 4)) else {
                warn!("EXTH item {i} header truncated");
                break;
            };
            let size = size as usize;
            if size < ITEM_HEADER_LEN || pos + size > exth.len() {
                warn!("EXTH item {i} (type {kind}) has bad size {size}");
                break;
            }
            records.push(ExthRecord {
                kind,
                data_offset: start + pos + ITEM_HEADER_LEN,
                data: exth[pos + ITEM_HEADER_LEN..pos + size].to_vec(),
            });
            pos += size;
        }
        debug!("parsed {} EXTH records", records.len());
        Self { records }
    }

    pub fn records(&self) -> &[ExthRecord] {
        &self.records
    }

    /// Payload of the last record of `kind`.
    pub fn get(&self, kind: u32) -> Option<&[u8]> {
        self.records
            .iter()
            .rev()
            .find(|r| r.kind == kind)
            .map(|r| r.data.as_slice())
    }

    pub fn as_map(&self) -> BTreeMap<u32, Vec<u8>> {
        self.records
            .iter()
            .map(|r| (r.kind, r.data.clone()))
            .collect()
    }

    /// Non-zero rental expiry, when the book is a library or rental loan.
    pub fn rental_expiry(&self) -> Option<u64> {
        self.get(EXTH_RENTAL_EXPIRY)
            .and_then(|d| be_u64(d, 0))
            .filter(|&v| v != 0)
    }

    /// Rewrites that lift reader restrictions.
    pub fn restriction_patches(&self) -> Vec<ExthPatch> {
        let mut patches = Vec::new();
        for record in &self.records {
            let bytes = match (record.kind, record.data.len()) {
                (EXTH_CLIPPING_LIMIT, 1) => vec![100],
                (EXTH_TTS_DISABLED, 1) => vec![0],
                (EXTH_RENTAL, 1) => vec![0],
                (EXTH_RENTAL_EXPIRY, 8) => vec![0; 8],
                (EXTH_WATERMARK, len) if len > 0 => vec![0; len],
                _ => continue,
            };
            patches.push(ExthPatch {
                kind: record.kind,
                offset: record.data_offset,
                bytes,
            });
        }
        patches
    }
}
