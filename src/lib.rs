//! Mobipocket PID DRM removal.
//!
//! The PC1 cipher, the PID checksum scheme, the key-record search inside
//! record 0 and in-place decryption of the text records. A batch layer runs
//! many books on a worker pool and writes per-book reports.
//!
//! ```rust,no_run
//! let raw = std::fs::read("book.azw").unwrap();
//! let clear = mobistrip::decrypt_mobi(&raw, &["ABCDEFGHHA"]).unwrap();
//! assert_eq!(clear.len(), raw.len());
//! ```

pub mod batch;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod drm;
pub mod error;
pub mod logging;
pub mod mobi;
pub mod pid;
pub mod report;
pub mod util;

pub use drm::{BookKind, MobiBook, UnlockOptions, UnlockedBook, decrypt_mobi};
pub use error::{CryptoType, DrmError, DrmResult};
pub use pid::{Pid, checksum_pid, kindle_pid};
