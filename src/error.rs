use std::io;
use thiserror::Error;

use crate::audio::{CodecError, SinkError};
use crate::protocol::crypto::CryptoError;
use crate::protocol::daap::DmapDecodeError;
use crate::protocol::rtsp::TransportParseError;
use crate::protocol::sdp::SdpError;

/// Errors raised while handling an RTSP request
///
/// Every variant is answered with `500 Internal Server Error`; fatal ones
/// additionally reset the session's audio pipeline.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed or out-of-order client input
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Key unwrap or payload decryption failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A local resource (socket, audio device) could not be set up
    #[error("resource error: {0}")]
    Resource(String),
}

impl SessionError {
    /// Shorthand for a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Check if this error must tear down the audio pipeline
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Crypto(_))
    }
}

impl From<SdpError> for SessionError {
    fn from(err: SdpError) -> Self {
        match err {
            SdpError::Crypto(e) => Self::Crypto(e),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<TransportParseError> for SessionError {
    fn from(err: TransportParseError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<DmapDecodeError> for SessionError {
    fn from(err: DmapDecodeError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<SinkError> for SessionError {
    fn from(err: SinkError) -> Self {
        Self::Resource(err.to_string())
    }
}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self {
        Self::Resource(err.to_string())
    }
}

/// Errors starting or running the receiver
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// Receiver already running
    #[error("receiver already running")]
    AlreadyRunning,

    /// The configured private key could not be loaded
    #[error("invalid private key: {0}")]
    Key(#[from] CryptoError),

    /// mDNS advertisement failed
    #[error("advertisement error: {0}")]
    Advertisement(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] io::Error),
}

impl ReceiverError {
    /// Check if retrying `start` could succeed
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Advertisement(_))
    }
}

/// Result type alias for receiver operations
pub type Result<T> = std::result::Result<T, ReceiverError>;
