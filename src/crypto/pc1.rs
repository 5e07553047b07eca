//! Pukall Cipher 1.
//!
//! A byte-oriented stream cipher keyed by 16 bytes. The running key state is
//! perturbed by every plaintext byte, so encryption and decryption differ only
//! in which side of the XOR feeds the key update.

use crate::error::{DrmError, DrmResult};

pub const PC1_KEY_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Encrypt,
    Decrypt,
}

#[derive(Debug, Clone)]
pub struct Pc1 {
    wkey: [u16; 8],
    sum1: u16,
    sum2: u16,
    mode: CipherMode,
}

impl Pc1 {
    pub fn new(key: &[u8], mode: CipherMode) -> DrmResult<Self> {
        if key.len() != PC1_KEY_LEN {
            return Err(DrmError::InvalidKeyLength(key.len()));
        }
        let mut wkey = [0u16; 8];
        for (i, word) in wkey.iter_mut().enumerate() {
            *word = u16::from_be_bytes([key[i * 2], key[i * 2 + 1]]);
        }
        Ok(Self {
            wkey,
            sum1: 0,
            sum2: 0,
            mode,
        })
    }

    fn keystream_word(&mut self) -> u16 {
        let mut temp1 = 0u16;
        let mut byte_xor = 0u16;
        for (j, word) in self.wkey.iter().enumerate() {
            temp1 ^= *word;
            self.sum2 = self
                .sum2
                .wrapping_add(j as u16)
                .wrapping_mul(20021)
                .wrapping_add(self.sum1);
            self.sum1 = temp1.wrapping_mul(346);
            self.sum2 = self.sum2.wrapping_add(self.sum1);
            temp1 = temp1.wrapping_mul(20021).wrapping_add(1);
            byte_xor ^= temp1 ^ self.sum2;
        }
        byte_xor
    }

    fn apply_byte(&mut self, input: u8) -> u8 {
        let byte_xor = self.keystream_word();
        let output = input ^ (byte_xor >> 8) as u8 ^ byte_xor as u8;
        // The key update always uses the plaintext byte.
        let feedback = match self.mode {
            CipherMode::Encrypt => input,
            CipherMode::Decrypt => output,
        };
        let key_xor = u16::from(feedback).wrapping_mul(257);
        for word in self.wkey.iter_mut() {
            *word ^= key_xor;
        }
        output
    }

    /// Process bytes, storing the result in the same buffer.
    pub fn apply_in_place(&mut self, buffer: &mut [u8]) {
        for b in buffer.iter_mut() {
            *b = self.apply_byte(*b);
        }
    }

    /// Process bytes, returning a vector.
    pub fn apply(&mut self, buffer: &[u8]) -> Vec<u8> {
        buffer.iter().map(|&b| self.apply_byte(b)).collect()
    }
}

/// One-shot PC1 over `src`. Output length equals input length.
pub fn pc1(key: &[u8], src: &[u8], mode: CipherMode) -> DrmResult<Vec<u8>> {
    Ok(Pc1::new(key, mode)?.apply(src))
}

pub fn pc1_in_place(key: &[u8], buffer: &mut [u8], mode: CipherMode) -> DrmResult<()> {
    Pc1::new(key, mode)?.apply_in_place(buffer);
    Ok(())
}
