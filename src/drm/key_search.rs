//! DRM key-record search.
//!
//! Record 0 carries a table of 0x30-byte key records. Each one holds a
//! cookie encrypted under a key derived from one PID; the cookie in turn
//! holds the content key for the book.

use tracing::debug;

use crate::crypto::{CipherMode, pc1};
use crate::error::{DrmError, DrmResult};
use crate::mobi::DrmInfo;
use crate::pid::Pid;

/// Fixed key used to derive per-PID keys, and as the key for books with
/// default encryption.
pub const KEYVEC1: [u8; 16] = [
    0x72, 0x38, 0x33, 0xB0, 0xB4, 0xF2, 0xE3, 0xCA, 0xDF, 0x09, 0x01, 0xD6, 0xE2, 0xE0, 0x3F,
    0x96,
];

pub const KEY_RECORD_LEN: usize = 0x30;
const COOKIE_LEN: usize = 32;
const COOKIE_FLAGS_MASK: u32 = 0x1F;

/// 16-byte key that decrypts the text records.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ContentKey(pub [u8; 16]);

impl ContentKey {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContentKey(<redacted>)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrmKeyRecord {
    pub verification: u32,
    pub size: u32,
    pub kind: u32,
    pub checksum: u8,
    pub cookie: [u8; COOKIE_LEN],
}

impl DrmKeyRecord {
    pub fn parse(bytes: &[u8]) -> DrmResult<Self> {
        if bytes.len() < KEY_RECORD_LEN {
            return Err(DrmError::invalid("DRM key record truncated"));
        }
        let word = |off: usize| {
            u32::from_be_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
        };
        let mut cookie = [0u8; COOKIE_LEN];
        cookie.copy_from_slice(&bytes[16..16 + COOKIE_LEN]);
        Ok(Self {
            verification: word(0),
            size: word(4),
            kind: word(8),
            checksum: bytes[12],
            cookie,
        })
    }

    pub fn to_bytes(&self) -> [u8; KEY_RECORD_LEN] {
        let mut out = [0u8; KEY_RECORD_LEN];
        out[0..4].copy_from_slice(&self.verification.to_be_bytes());
        out[4..8].copy_from_slice(&self.size.to_be_bytes());
        out[8..12].copy_from_slice(&self.kind.to_be_bytes());
        out[12] = self.checksum;
        out[16..].copy_from_slice(&self.cookie);
        out
    }
}

/// Plaintext layout of a key record's cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cookie {
    pub verification: u32,
    pub flags: u32,
    pub content_key: [u8; 16],
    pub expiry: u32,
    pub expiry2: u32,
}

impl Cookie {
    fn parse(bytes: &[u8]) -> Self {
        let word = |off: usize| {
            u32::from_be_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
        };
        let mut content_key = [0u8; 16];
        content_key.copy_from_slice(&bytes[8..24]);
        Self {
            verification: word(0),
            flags: word(4),
            content_key,
            expiry: word(24),
            expiry2: word(28),
        }
    }

    pub fn to_bytes(&self) -> [u8; COOKIE_LEN] {
        let mut out = [0u8; COOKIE_LEN];
        out[0..4].copy_from_slice(&self.verification.to_be_bytes());
        out[4..8].copy_from_slice(&self.flags.to_be_bytes());
        out[8..24].copy_from_slice(&self.content_key);
        out[24..28].copy_from_slice(&self.expiry.to_be_bytes());
        out[28..32].copy_from_slice(&self.expiry2.to_be_bytes());
        out
    }
}

/// Per-PID key used to encrypt cookies.
pub fn derive_temp_key(pid: &Pid) -> DrmResult<[u8; 16]> {
    let encrypted = pc1(&KEYVEC1, &pid.key_material(), CipherMode::Encrypt)?;
    let mut key = [0u8; 16];
    key.copy_from_slice(&encrypted);
    Ok(key)
}

pub fn key_sum(key: &[u8]) -> u8 {
    key.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// The `drm.count` key records, exactly.
fn key_table<'a>(section0: &'a [u8], drm: &DrmInfo) -> DrmResult<&'a [u8]> {
    if drm.count == 0 {
        return Err(DrmError::EncryptionNotInitialised);
    }
    let table = drm.key_table(section0)?;
    let needed = (drm.count as usize)
        .checked_mul(KEY_RECORD_LEN)
        .ok_or_else(|| DrmError::invalid("DRM key count overflows"))?;
    if needed > table.len() {
        return Err(DrmError::invalid(format!(
            "DRM key table holds {} bytes, {} records need {needed}",
            table.len(),
            drm.count
        )));
    }
    Ok(&table[..needed])
}

fn scan(
    section0: &[u8],
    drm: &DrmInfo,
    temp_key: &[u8; 16],
    require_flags: bool,
) -> DrmResult<Option<ContentKey>> {
    let temp_key_sum = key_sum(temp_key);
    let table = key_table(section0, drm)?;
    for (index, chunk) in table.chunks_exact(KEY_RECORD_LEN).enumerate() {
        let record = DrmKeyRecord::parse(chunk)?;
        if record.checksum != temp_key_sum {
            continue;
        }
        let cookie = Cookie::parse(&pc1(temp_key, &record.cookie, CipherMode::Decrypt)?);
        if cookie.verification != record.verification {
            continue;
        }
        if require_flags && cookie.flags & COOKIE_FLAGS_MASK != 1 {
            continue;
        }
        debug!("key record {index} matched");
        return Ok(Some(ContentKey(cookie.content_key)));
    }
    Ok(None)
}

/// Find the content key unlocked by `pid`.
pub fn find_key(section0: &[u8], drm: &DrmInfo, pid: &str) -> DrmResult<ContentKey> {
    let pid = Pid::parse(pid)?;
    find_key_for(section0, drm, &pid)
}

pub fn find_key_for(section0: &[u8], drm: &DrmInfo, pid: &Pid) -> DrmResult<ContentKey> {
    let temp_key = derive_temp_key(pid)?;
    scan(section0, drm, &temp_key, true)?.ok_or(DrmError::KeyNotFound { tried: 1 })
}

/// Books with default encryption store a cookie under [`KEYVEC1`] itself.
pub fn find_default_key(section0: &[u8], drm: &DrmInfo) -> DrmResult<ContentKey> {
    scan(section0, drm, &KEYVEC1, false)?.ok_or(DrmError::KeyNotFound { tried: 0 })
}

/// Build a key record that `pid` unlocks. Used to author test books.
pub fn seal_key_record(
    pid: &Pid,
    content_key: &[u8; 16],
    verification: u32,
) -> DrmResult<DrmKeyRecord> {
    let temp_key = derive_temp_key(pid)?;
    seal_with(&temp_key, content_key, verification, 1)
}

pub fn seal_default_key_record(
    content_key: &[u8; 16],
    verification: u32,
) -> DrmResult<DrmKeyRecord> {
    seal_with(&KEYVEC1, content_key, verification, 0)
}

fn seal_with(
    temp_key: &[u8; 16],
    content_key: &[u8; 16],
    verification: u32,
    flags: u32,
) -> DrmResult<DrmKeyRecord> {
    let cookie = Cookie {
        verification,
        flags,
        content_key: *content_key,
        expiry: 0,
        expiry2: 0xFFFF_FFFF,
    };
    let sealed = pc1(temp_key, &cookie.to_bytes(), CipherMode::Encrypt)?;
    let mut bytes = [0u8; COOKIE_LEN];
    bytes.copy_from_slice(&sealed);
    Ok(DrmKeyRecord {
        verification,
        size: KEY_RECORD_LEN as u32,
        kind: 1,
        checksum: key_sum(temp_key),
        cookie: bytes,
    })
}
