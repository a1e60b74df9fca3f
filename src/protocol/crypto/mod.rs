//! Cryptographic primitives for the AirTunes receiver
//!
//! Two independent operations make up RAOP stream security:
//!
//! - unwrapping the per-stream AES key sent in ANNOUNCE with the device's
//!   RSA private key (OAEP, SHA-1)
//! - decrypting each audio payload with AES-128-CBC, restarting from the
//!   negotiated IV for every packet
//!
//! The same private key also signs `Apple-Challenge` responses.

use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};

mod aes;
mod error;
mod rsa;

#[cfg(test)]
mod tests;

pub use self::aes::{CryptoMaterial, PayloadCipher};
pub use self::error::CryptoError;
pub use self::rsa::{ReceiverKey, sizes as rsa_sizes};

/// Length of various cryptographic values
pub mod lengths {
    /// AES-128 key length
    pub const AES_128_KEY: usize = 16;
    /// AES block length, also the IV length
    pub const AES_BLOCK: usize = 16;
    /// Decoded `Apple-Challenge` length
    pub const CHALLENGE: usize = 16;
    /// Hardware (MAC) address length
    pub const HW_ADDRESS: usize = 6;
}

/// Standard-alphabet base64 that accepts input with or without padding
///
/// Senders strip the `=` padding from `rsaaeskey`, `aesiv` and
/// `Apple-Challenge`; encoding still pads.
pub const BASE64_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);
