//! RSA private key operations for RAOP receivers

use std::fmt;

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use super::CryptoError;

/// RSA key sizes used in RAOP
pub mod sizes {
    /// Modulus size of the device key (2048 bits)
    pub const MODULUS_BITS: usize = 2048;
    /// Modulus size in bytes, also the signature length
    pub const MODULUS_BYTES: usize = 256;
}

/// Private key held by the receiver
///
/// Senders encrypt the per-stream AES key against the matching public key
/// and verify `Apple-Response` signatures with it.
pub struct ReceiverKey {
    inner: RsaPrivateKey,
}

impl ReceiverKey {
    /// Generate a fresh key
    ///
    /// Only useful for senders that skip key verification; iTunes and iOS
    /// expect the well-known device key, which must be loaded with
    /// [`ReceiverKey::from_pem`].
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RngError` if key generation fails.
    pub fn generate() -> Result<Self, CryptoError> {
        use rand::rngs::OsRng;

        let inner =
            RsaPrivateKey::new(&mut OsRng, sizes::MODULUS_BITS).map_err(|_| CryptoError::RngError)?;

        Ok(Self { inner })
    }

    /// Load from a PEM-encoded private key, PKCS#1 or PKCS#8
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidPrivateKey` if neither encoding parses.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let inner = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;

        Ok(Self { inner })
    }

    /// Unwrap an RSA-OAEP (SHA-1) encrypted symmetric key
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` if the padding check fails.
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.inner
            .decrypt(Oaep::new::<Sha1>(), wrapped)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }

    /// Sign a challenge message
    ///
    /// Produces a raw PKCS#1 v1.5 type 1 signature over `message` with no
    /// digest prefix, which is what `Apple-Response` carries.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SigningFailed` if the message is too long for
    /// the modulus.
    pub fn sign_challenge(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.inner
            .sign(Pkcs1v15Sign::new_unprefixed(), message)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))
    }

    /// Get the corresponding public key
    #[must_use]
    pub fn public_key(&self) -> RsaPublicKey {
        self.inner.to_public_key()
    }

    /// Modulus size in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size()
    }
}

impl fmt::Debug for ReceiverKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverKey")
            .field("bits", &(self.size() * 8))
            .finish_non_exhaustive()
    }
}
