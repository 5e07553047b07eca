//! Mobipocket PIDs: checksum suffixes and serial-derived PIDs.

use std::fmt;

use crate::error::{DrmError, DrmResult};

/// PID alphabet; `O` and `0` are left out.
pub const PID_LETTERS: &[u8; 34] = b"ABCDEFGHIJKLMNPQRSTUVWXYZ123456789";

pub const PID_BASE_LEN: usize = 8;
pub const PID_CHECKED_LEN: usize = 10;

/// Reflected CRC-32 with a zero initial register and no final inversion.
pub fn crc32_amazon(bytes: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &b in bytes {
        crc ^= b as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320u32 & mask);
        }
    }
    crc
}

fn letter(index: usize) -> char {
    PID_LETTERS[index % PID_LETTERS.len()] as char
}

/// Append the two checksum characters to `pid`.
pub fn checksum_pid(pid: &str) -> String {
    let mut crc = crc32_amazon(pid.as_bytes());
    crc ^= crc >> 16;
    let l = PID_LETTERS.len();
    let mut out = String::with_capacity(pid.len() + 2);
    out.push_str(pid);
    for _ in 0..2 {
        let b = (crc & 0xFF) as usize;
        out.push(letter((b / l) ^ (b % l)));
        crc >>= 8;
    }
    out
}

/// Fold `serial` into a `length`-character PID.
pub fn pid_from_serial(serial: &[u8], length: usize) -> String {
    if length == 0 {
        return String::new();
    }
    let crc = crc32_amazon(serial);
    let mut acc = vec![0u8; length];
    for (i, &b) in serial.iter().enumerate() {
        acc[i % length] ^= b;
    }
    let crc_bytes = crc.to_be_bytes();
    for (i, slot) in acc.iter_mut().enumerate() {
        *slot ^= crc_bytes[i & 3];
    }
    acc.iter()
        .map(|&b| letter(((b >> 7) + (((b >> 5) & 3) ^ (b & 0x1F))) as usize))
        .collect()
}

/// Checksummed PID for a Kindle serial number or an iPhone/iPod UDID.
pub fn kindle_pid(serial: &str) -> DrmResult<String> {
    let serial = serial.trim();
    match serial.len() {
        16 if serial.starts_with('B') || serial.starts_with('9') => {
            let mut pid = pid_from_serial(serial.as_bytes(), 7);
            pid.push('*');
            Ok(checksum_pid(&pid))
        }
        40 => Ok(checksum_pid(&pid_from_serial(serial.as_bytes(), 8))),
        _ => Err(DrmError::UnrecognizedSerial(serial.to_string())),
    }
}

/// A candidate PID, reduced to its 8-character base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pid {
    base: String,
}

impl Pid {
    /// Accepts 8-character PIDs as-is and 10-character PIDs whose checksum
    /// verifies. PIDs are ASCII; anything else is rejected.
    pub fn parse(candidate: &str) -> DrmResult<Self> {
        let candidate = candidate.trim();
        if !candidate.is_ascii() {
            return Err(DrmError::InvalidPidCharacters(candidate.to_string()));
        }
        match candidate.len() {
            PID_BASE_LEN => Ok(Self {
                base: candidate.to_string(),
            }),
            PID_CHECKED_LEN => {
                let base = candidate[..PID_BASE_LEN].to_string();
                let expected = checksum_pid(&base);
                if expected != candidate {
                    return Err(DrmError::InvalidPidChecksum {
                        pid: candidate.to_string(),
                        expected,
                    });
                }
                Ok(Self { base })
            }
            _ => Err(DrmError::InvalidPidLength(candidate.to_string())),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Base PID padded with NULs to 16 bytes, as fed to PC1.
    pub fn key_material(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        for (dst, src) in out.iter_mut().zip(self.base.as_bytes()) {
            *dst = *src;
        }
        out
    }

    pub fn with_checksum(&self) -> String {
        checksum_pid(&self.base)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.with_checksum())
    }
}
