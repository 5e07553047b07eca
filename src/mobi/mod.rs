//! # MOBI Container
//!
//! Minimal PDB/MOBI container handling: the section table, section slicing,
//! and length-preserving patches. Record 0 interpretation lives in
//! [`header`]; the EXTH metadata block in [`exth`].

pub mod exth;
pub mod header;

use std::ops::Range;

use crate::error::{DrmError, DrmResult};

pub use exth::{ExthBlock, ExthRecord};
pub use header::{DrmInfo, HeaderLayout, MobiHeader};

pub const PDB_HEADER_LEN: usize = 78;
pub const PDB_NAME_LEN: usize = 32;
pub const SECTION_ENTRY_LEN: usize = 8;
const TYPE_CREATOR_OFFSET: usize = 0x3C;
pub const MOBI_MAGIC: &[u8; 8] = b"BOOKMOBI";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub offset: u32,
    pub flags: u8,
    /// 24-bit unique id.
    pub value: u32,
}

#[derive(Debug, Clone)]
pub struct SectionTable {
    sections: Vec<Section>,
    file_len: usize,
}

impl SectionTable {
    pub fn parse(raw: &[u8]) -> DrmResult<Self> {
        if raw.len() < PDB_HEADER_LEN {
            return Err(DrmError::invalid("file shorter than PDB header"));
        }
        if &raw[TYPE_CREATOR_OFFSET..TYPE_CREATOR_OFFSET + 8] != MOBI_MAGIC {
            return Err(DrmError::invalid("not a BOOKMOBI file"));
        }

        let count = u16::from_be_bytes([raw[76], raw[77]]) as usize;
        if count == 0 {
            return Err(DrmError::invalid("PDB has no sections"));
        }
        let table_end = PDB_HEADER_LEN + count * SECTION_ENTRY_LEN;
        if table_end > raw.len() {
            return Err(DrmError::invalid("section table truncated"));
        }

        let mut sections = Vec::with_capacity(count);
        for i in 0..count {
            let base = PDB_HEADER_LEN + i * SECTION_ENTRY_LEN;
            let entry = &raw[base..base + SECTION_ENTRY_LEN];
            let offset = u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]);
            let value = u32::from_be_bytes([0, entry[5], entry[6], entry[7]]);
            sections.push(Section {
                offset,
                flags: entry[4],
                value,
            });
        }

        if (sections[0].offset as usize) < table_end {
            return Err(DrmError::invalid("section 0 overlaps the section table"));
        }
        for pair in sections.windows(2) {
            if pair[1].offset < pair[0].offset {
                return Err(DrmError::invalid("section offsets are not ascending"));
            }
        }
        if let Some(last) = sections.last() {
            if last.offset as usize > raw.len() {
                return Err(DrmError::invalid("section offset past end of file"));
            }
        }

        Ok(Self {
            sections,
            file_len: raw.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn file_len(&self) -> usize {
        self.file_len
    }

    /// Byte range of section `index`; the last section runs to end of file.
    pub fn range(&self, index: usize) -> DrmResult<Range<usize>> {
        let section = self
            .sections
            .get(index)
            .ok_or_else(|| DrmError::invalid(format!("section {index} out of range")))?;
        let end = self
            .sections
            .get(index + 1)
            .map(|s| s.offset as usize)
            .unwrap_or(self.file_len);
        Ok(section.offset as usize..end)
    }

    pub fn load_section<'a>(&self, raw: &'a [u8], index: usize) -> DrmResult<&'a [u8]> {
        let range = self.range(index)?;
        raw.get(range)
            .ok_or_else(|| DrmError::invalid(format!("section {index} past end of buffer")))
    }

    /// Overwrite bytes inside section `index`, starting `in_offset` bytes
    /// into it. The write must stay inside the section.
    pub fn patch_section(
        &self,
        buf: &mut [u8],
        index: usize,
        new: &[u8],
        in_offset: usize,
    ) -> DrmResult<()> {
        let range = self.range(index)?;
        let start = range.start.saturating_add(in_offset);
        if start.saturating_add(new.len()) > range.end {
            return Err(DrmError::PatchOutOfBounds {
                section: index,
                offset: in_offset,
                len: new.len(),
            });
        }
        patch(buf, start, new)
    }
}

/// Length-preserving overwrite of `buf[offset..offset + new.len()]`.
pub fn patch(buf: &mut [u8], offset: usize, new: &[u8]) -> DrmResult<()> {
    let end = offset
        .checked_add(new.len())
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| DrmError::invalid(format!("patch at {offset} past end of buffer")))?;
    buf[offset..end].copy_from_slice(new);
    Ok(())
}

/// PDB database name: the first 32 bytes up to the first NUL.
pub fn pdb_name(raw: &[u8]) -> &[u8] {
    let name = &raw[..raw.len().min(PDB_NAME_LEN)];
    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    &name[..end]
}
