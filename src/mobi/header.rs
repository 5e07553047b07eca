//! Record 0: PalmDOC header, MOBI header and the DRM fields.

use crate::error::{CryptoType, DrmError, DrmResult};

pub const COMPRESSION_HUFF_CDIC: u16 = 17480;

const OFF_COMPRESSION: usize = 0x00;
const OFF_RECORD_COUNT: usize = 0x08;
pub const OFF_CRYPTO_TYPE: usize = 0x0C;
const OFF_MOBI_LENGTH: usize = 0x14;
const OFF_CODEPAGE: usize = 0x1C;
const OFF_FULL_NAME: usize = 0x54;
const OFF_MOBI_VERSION: usize = 0x68;
const OFF_EXTH_FLAGS: usize = 0x80;
pub const OFF_DRM_FIELDS: usize = 0xA8;
pub const DRM_FIELDS_LEN: usize = 16;
const OFF_EXTRA_DATA_FLAGS: usize = 0xF2;

/// The MOBI header starts this far into record 0.
pub const MOBI_HEADER_START: usize = 16;
const EXTRA_FLAGS_MIN_HEADER_LEN: u32 = 0xE4;
const EXTRA_FLAGS_MIN_VERSION: u32 = 6;
const EXTH_PRESENT: u32 = 0x40;

pub fn be_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn be_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset.checked_add(8)?)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Some(u64::from_be_bytes(buf))
}

/// Where (and whether) the extra-data flags live, by header revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    /// MOBI version below 6: no extra-data flags.
    Legacy,
    /// Version 6 or later with a header shorter than 0xE4: no extra-data flags.
    ShortV6,
    /// Extra-data flags present as a u16 at 0xF2.
    Extended,
}

impl HeaderLayout {
    pub fn select(version: u32, header_len: u32) -> Self {
        if version < EXTRA_FLAGS_MIN_VERSION {
            HeaderLayout::Legacy
        } else if header_len < EXTRA_FLAGS_MIN_HEADER_LEN {
            HeaderLayout::ShortV6
        } else {
            HeaderLayout::Extended
        }
    }

    pub fn extra_flags_offset(self) -> Option<usize> {
        match self {
            HeaderLayout::Extended => Some(OFF_EXTRA_DATA_FLAGS),
            HeaderLayout::Legacy | HeaderLayout::ShortV6 => None,
        }
    }
}

/// The four DRM words at 0xA8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrmInfo {
    pub ptr: u32,
    pub count: u32,
    pub size: u32,
    pub flags: u32,
}

impl DrmInfo {
    fn parse(section0: &[u8]) -> Option<Self> {
        Some(Self {
            ptr: be_u32(section0, OFF_DRM_FIELDS)?,
            count: be_u32(section0, OFF_DRM_FIELDS + 4)?,
            size: be_u32(section0, OFF_DRM_FIELDS + 8)?,
            flags: be_u32(section0, OFF_DRM_FIELDS + 12)?,
        })
    }

    /// The key table bytes inside record 0.
    pub fn key_table<'a>(&self, section0: &'a [u8]) -> DrmResult<&'a [u8]> {
        let start = self.ptr as usize;
        let end = start
            .checked_add(self.size as usize)
            .ok_or_else(|| DrmError::invalid("DRM key table size overflows"))?;
        section0
            .get(start..end)
            .ok_or_else(|| DrmError::invalid("DRM key table lies outside record 0"))
    }
}

#[derive(Debug, Clone)]
pub struct MobiHeader {
    pub compression: u16,
    pub records: u16,
    pub crypto_type: CryptoType,
    pub mobi_length: u32,
    pub codepage: u32,
    pub version: u32,
    pub exth_flags: u32,
    pub full_name: Option<(u32, u32)>,
    pub layout: HeaderLayout,
    /// Already adjusted for compression: bit 0 is cleared unless the book is
    /// HUFF/CDIC compressed.
    pub extra_data_flags: u16,
    pub drm: Option<DrmInfo>,
}

impl MobiHeader {
    pub fn parse(section0: &[u8]) -> DrmResult<Self> {
        let short = || DrmError::invalid("record 0 too short for PalmDOC header");
        let compression = be_u16(section0, OFF_COMPRESSION).ok_or_else(short)?;
        let records = be_u16(section0, OFF_RECORD_COUNT).ok_or_else(short)?;
        let crypto_type = CryptoType::from_raw(be_u16(section0, OFF_CRYPTO_TYPE).ok_or_else(short)?);

        let mobi_length = be_u32(section0, OFF_MOBI_LENGTH).unwrap_or(0);
        let codepage = be_u32(section0, OFF_CODEPAGE).unwrap_or(1252);
        let version = be_u32(section0, OFF_MOBI_VERSION).unwrap_or(0);
        let exth_flags = be_u32(section0, OFF_EXTH_FLAGS).unwrap_or(0);
        let full_name = be_u32(section0, OFF_FULL_NAME)
            .zip(be_u32(section0, OFF_FULL_NAME + 4))
            .filter(|&(_, len)| len > 0);

        let layout = HeaderLayout::select(version, mobi_length);
        let mut extra_data_flags = layout
            .extra_flags_offset()
            .and_then(|off| be_u16(section0, off))
            .unwrap_or(0);
        if compression != COMPRESSION_HUFF_CDIC {
            // PalmDOC books encrypt the multibyte trailer along with the text.
            extra_data_flags &= 0xFFFE;
        }

        let header_end = MOBI_HEADER_START + mobi_length as usize;
        let drm = if header_end >= OFF_DRM_FIELDS + DRM_FIELDS_LEN {
            DrmInfo::parse(section0)
        } else {
            None
        };

        Ok(Self {
            compression,
            records,
            crypto_type,
            mobi_length,
            codepage,
            version,
            exth_flags,
            full_name,
            layout,
            extra_data_flags,
            drm,
        })
    }

    pub fn has_exth(&self) -> bool {
        self.exth_flags & EXTH_PRESENT != 0
    }

    /// Offset of the EXTH block inside record 0.
    pub fn exth_offset(&self) -> usize {
        MOBI_HEADER_START + self.mobi_length as usize
    }

    pub fn drm_info(&self) -> DrmResult<DrmInfo> {
        self.drm
            .ok_or_else(|| DrmError::invalid("MOBI header too short to hold DRM fields"))
    }
}

/// Decode metadata text in the book's declared encoding.
pub fn decode_text(bytes: &[u8], codepage: u32) -> String {
    match codepage {
        65001 => String::from_utf8_lossy(bytes).into_owned(),
        _ => bytes.iter().map(|&c| c as char).collect(),
    }
}
