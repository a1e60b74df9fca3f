//! SDP (Session Description Protocol) for RAOP
//!
//! Senders describe the audio stream in the body of ANNOUNCE. Only the
//! narrow dialect AirTunes senders produce is understood: one audio media
//! line, its `rtpmap` and `fmtp` attributes and the optional AES key
//! material.

mod alac;
mod announce;

#[cfg(test)]
mod tests;

pub use alac::AlacParameters;
pub use announce::{AnnounceDescription, NegotiatedStream};

use crate::protocol::crypto::CryptoError;
use thiserror::Error;

/// Content type of ANNOUNCE bodies
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Encoding name of Apple Lossless in `rtpmap`
pub const APPLE_LOSSLESS: &str = "AppleLossless";

#[derive(Debug, Error)]
pub enum SdpError {
    #[error("Cannot parse SDP line {0}")]
    InvalidLine(String),

    #[error("Cannot parse SDP {attribute}'s setting {value}")]
    InvalidSetting { attribute: char, value: String },

    #[error("Cannot parse SDP rtpmap entry {0}")]
    InvalidRtpmap(String),

    #[error("Cannot parse SDP fmtp entry {0}")]
    InvalidFmtp(String),

    #[error("Invalid base64 in {attribute}")]
    InvalidBase64 { attribute: &'static str },

    #[error("Audio format {0} not supported")]
    UnsupportedFormat(FormatIndex),

    #[error("Audio format {0} lacks fmtp line")]
    MissingFmtp(FormatIndex),

    #[error("Audio format {0} incomplete, format options not set")]
    MissingFormatOptions(FormatIndex),

    #[error("invalid ALAC parameters: {0}")]
    InvalidAlacParameters(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// RTP payload format index, absent until a line declares it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatIndex(pub Option<u32>);

impl std::fmt::Display for FormatIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(index) => write!(f, "{index}"),
            None => f.write_str("<none>"),
        }
    }
}
