//! Error taxonomy for the decryption core.

use std::fmt;

use thiserror::Error;

/// Value of the 2-byte crypto type field in record 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoType {
    None,
    Legacy,
    Pid,
    Unknown(u16),
}

impl CryptoType {
    pub fn from_raw(value: u16) -> Self {
        match value {
            0 => CryptoType::None,
            1 => CryptoType::Legacy,
            2 => CryptoType::Pid,
            other => CryptoType::Unknown(other),
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            CryptoType::None => 0,
            CryptoType::Legacy => 1,
            CryptoType::Pid => 2,
            CryptoType::Unknown(v) => v,
        }
    }
}

impl fmt::Display for CryptoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoType::None => write!(f, "book is not encrypted"),
            CryptoType::Legacy => write!(
                f,
                "legacy Mobipocket encryption (type 1) is not supported"
            ),
            CryptoType::Pid => write!(f, "PID encryption (type 2)"),
            CryptoType::Unknown(v) => write!(f, "unknown Mobipocket encryption type {v}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DrmError {
    #[error("PC1 key must be 16 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error("{0}")]
    UnsupportedEncryption(CryptoType),
    #[error("PID {pid} has incorrect checksum, expected {expected}")]
    InvalidPidChecksum { pid: String, expected: String },
    #[error("PID {0} has wrong number of characters")]
    InvalidPidLength(String),
    #[error("PID {0} contains non-ASCII characters")]
    InvalidPidCharacters(String),
    #[error("unrecognized serial number: {0}")]
    UnrecognizedSerial(String),
    #[error("encryption not initialised; open the book with Mobipocket Reader first")]
    EncryptionNotInitialised,
    #[error("no key found in {tried} PIDs tried; wrong or missing key")]
    KeyNotFound { tried: usize },
    #[error("corrupt record {record}: {reason}")]
    CorruptRecord { record: usize, reason: String },
    #[error("patch of {len} bytes at {offset} overruns section {section}")]
    PatchOutOfBounds {
        section: usize,
        offset: usize,
        len: usize,
    },
}

impl DrmError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Short machine-readable label used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            DrmError::InvalidKeyLength(_) => "invalid_key_length",
            DrmError::InvalidFormat(_) => "invalid_format",
            DrmError::UnsupportedEncryption(CryptoType::None) => "not_encrypted",
            DrmError::UnsupportedEncryption(_) => "unsupported_encryption",
            DrmError::InvalidPidChecksum { .. } => "invalid_pid_checksum",
            DrmError::InvalidPidLength(_) => "invalid_pid_length",
            DrmError::InvalidPidCharacters(_) => "invalid_pid_characters",
            DrmError::UnrecognizedSerial(_) => "unrecognized_serial",
            DrmError::EncryptionNotInitialised => "encryption_not_initialised",
            DrmError::KeyNotFound { .. } => "key_not_found",
            DrmError::CorruptRecord { .. } => "corrupt_record",
            DrmError::PatchOutOfBounds { .. } => "patch_out_of_bounds",
        }
    }
}

pub type DrmResult<T> = Result<T, DrmError>;
