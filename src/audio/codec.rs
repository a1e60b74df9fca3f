//! Codec adapter
//!
//! A decoder is configured once from the `fmtp` options negotiated in
//! ANNOUNCE and then turns each (decrypted) RTP payload into interleaved
//! 16-bit PCM.

use std::sync::Arc;

use super::format::{AudioFormat, ChannelConfig, FormatInfo, SampleFormat, SampleRate};
use crate::protocol::rtp::constants::FRAMES_PER_PACKET;

/// Codec errors
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// `decode` called before `configure`
    #[error("Decoder not configured")]
    NotConfigured,

    /// `fmtp` options rejected
    #[error("Invalid codec configuration: {0}")]
    InvalidConfiguration(String),

    /// Negotiated format cannot be played
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Compressed-frame to PCM transform
pub trait AudioDecoder: Send {
    /// `rtpmap` encoding name this decoder handles
    fn encoding_name(&self) -> &'static str;

    /// Configure from the `fmtp` options following the format index
    ///
    /// # Errors
    /// Returns `CodecError` if the options are malformed or describe a
    /// format this decoder cannot produce.
    fn configure(&mut self, options: &[String]) -> Result<FormatInfo, CodecError>;

    /// Decode one frame to interleaved samples
    ///
    /// # Errors
    /// Returns `CodecError` if the frame is corrupt or the decoder is not
    /// configured.
    fn decode(&mut self, frame: &[u8]) -> Result<Vec<i16>, CodecError>;
}

/// Factory producing a fresh decoder for each ANNOUNCE
pub type CodecFactory = Arc<dyn Fn() -> Box<dyn AudioDecoder> + Send + Sync>;

/// Decoder for the stream format RAOP senders actually use
///
/// Apple Lossless when the `decoders` feature is enabled, big-endian PCM
/// otherwise.
#[must_use]
pub fn default_codec_factory() -> CodecFactory {
    #[cfg(feature = "decoders")]
    {
        Arc::new(|| Box::new(super::alac::AlacDecoder::new()) as Box<dyn AudioDecoder>)
    }
    #[cfg(not(feature = "decoders"))]
    {
        pcm_codec_factory()
    }
}

/// Factory for [`PcmDecoder`]
#[must_use]
pub fn pcm_codec_factory() -> CodecFactory {
    Arc::new(|| Box::new(PcmDecoder::new()) as Box<dyn AudioDecoder>)
}

/// Uncompressed 16-bit big-endian PCM (`L16`)
///
/// `fmtp` options are `[<sample rate> [<channels> [<frames per packet>]]]`,
/// defaulting to 44100 Hz stereo with 352 frames per packet.
#[derive(Debug, Default)]
pub struct PcmDecoder {
    info: Option<FormatInfo>,
}

impl PcmDecoder {
    /// `rtpmap` encoding name
    pub const ENCODING: &'static str = "L16";

    /// Create an unconfigured decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioDecoder for PcmDecoder {
    fn encoding_name(&self) -> &'static str {
        Self::ENCODING
    }

    fn configure(&mut self, options: &[String]) -> Result<FormatInfo, CodecError> {
        fn numeric<T: std::str::FromStr>(
            value: Option<&String>,
            default: T,
        ) -> Result<T, CodecError> {
            value.map_or(Ok(default), |raw| {
                raw.parse()
                    .map_err(|_| CodecError::InvalidConfiguration(raw.clone()))
            })
        }

        let rate: u32 = numeric(options.first(), 44100)?;
        let channels: u8 = numeric(options.get(1), 2)?;
        let frames_per_packet: u32 = numeric(options.get(2), FRAMES_PER_PACKET)?;

        let sample_rate = SampleRate::from_hz(rate)
            .ok_or_else(|| CodecError::UnsupportedFormat(format!("{rate} Hz")))?;
        let channels = ChannelConfig::from_count(channels)
            .ok_or_else(|| CodecError::UnsupportedFormat(format!("{channels} channels")))?;

        let info = FormatInfo {
            format: AudioFormat::new(SampleFormat::I16, sample_rate, channels),
            frames_per_packet,
        };
        self.info = Some(info);
        Ok(info)
    }

    fn decode(&mut self, frame: &[u8]) -> Result<Vec<i16>, CodecError> {
        let info = self.info.ok_or(CodecError::NotConfigured)?;

        let frame_bytes = info.format.bytes_per_frame();
        if frame.len() % frame_bytes != 0 {
            return Err(CodecError::Decode(format!(
                "{} bytes is not a whole number of {frame_bytes}-byte frames",
                frame.len()
            )));
        }

        Ok(frame
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }
}
