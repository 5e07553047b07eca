//! # Crypto Module
//!
//! Stream cipher primitives used by Mobipocket DRM.

pub mod pc1;

pub use pc1::{CipherMode, PC1_KEY_LEN, Pc1, pc1, pc1_in_place};
