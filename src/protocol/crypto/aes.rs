//! AES-128-CBC decryption of RAOP audio payloads

use std::fmt;

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, KeyInit};
use zeroize::Zeroizing;

use super::CryptoError;
use super::lengths::{AES_128_KEY, AES_BLOCK};

/// Symmetric key and IV negotiated during ANNOUNCE
///
/// Immutable once built. The key bytes are wiped on drop.
#[derive(Clone)]
pub struct CryptoMaterial {
    key: Zeroizing<[u8; AES_128_KEY]>,
    iv: [u8; AES_BLOCK],
}

impl CryptoMaterial {
    /// Build from raw key and IV bytes
    ///
    /// # Errors
    ///
    /// Returns `CryptoError` if either value is not exactly 16 bytes.
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; AES_128_KEY] =
            key.try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: AES_128_KEY,
                    actual: key.len(),
                })?;
        let iv: [u8; AES_BLOCK] = iv.try_into().map_err(|_| CryptoError::InvalidIvLength {
            expected: AES_BLOCK,
            actual: iv.len(),
        })?;

        Ok(Self {
            key: Zeroizing::new(key),
            iv,
        })
    }

    /// Raw key bytes
    #[must_use]
    pub fn key(&self) -> &[u8; AES_128_KEY] {
        &self.key
    }

    /// Initialization vector
    #[must_use]
    pub fn iv(&self) -> &[u8; AES_BLOCK] {
        &self.iv
    }
}

impl fmt::Debug for CryptoMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoMaterial")
            .field("key", &"<redacted>")
            .field("iv", &self.iv)
            .finish()
    }
}

/// Per-packet AES-128-CBC payload decryptor
///
/// Every payload is an independent CBC unit starting from the negotiated
/// IV. Only whole 16-byte blocks are encrypted by senders; a trailing
/// partial block is sent in the clear and passed through untouched.
pub struct PayloadCipher {
    cipher: Aes128,
    iv: [u8; AES_BLOCK],
}

impl PayloadCipher {
    /// Create a decryptor for the given material
    #[must_use]
    pub fn new(material: &CryptoMaterial) -> Self {
        Self {
            cipher: Aes128::new(GenericArray::from_slice(material.key().as_slice())),
            iv: *material.iv(),
        }
    }

    /// Decrypt a payload into a new buffer
    #[must_use]
    pub fn decrypt(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = payload.to_vec();
        self.decrypt_in_place(&mut out);
        out
    }

    /// Decrypt a payload in place
    pub fn decrypt_in_place(&self, payload: &mut [u8]) {
        let aligned = payload.len() - payload.len() % AES_BLOCK;
        let mut prev = self.iv;

        for chunk in payload[..aligned].chunks_exact_mut(AES_BLOCK) {
            let mut ciphertext = [0u8; AES_BLOCK];
            ciphertext.copy_from_slice(chunk);

            let block = GenericArray::from_mut_slice(chunk);
            self.cipher.decrypt_block(block);

            // XOR with previous ciphertext (or IV for first block)
            for (b, p) in chunk.iter_mut().zip(prev.iter()) {
                *b ^= *p;
            }
            prev = ciphertext;
        }
    }
}

impl fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadCipher").finish_non_exhaustive()
    }
}
