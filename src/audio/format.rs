//! Audio format definitions

use std::time::Duration;

/// Sample format handed to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// 16-bit signed integer
    I16,
    /// 32-bit float
    F32,
}

impl SampleFormat {
    /// Width of one sample in bytes
    #[must_use]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::I16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

/// Rates an `fmtp` line may announce
///
/// The RTP timestamp of a stream counts frames at this rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleRate {
    /// Every AirTunes sender in the field
    #[default]
    Hz44100,
    /// Accepted for senders that resample
    Hz48000,
    /// Accepted for lossless high rate streams
    Hz96000,
}

impl SampleRate {
    /// Frames per second
    #[must_use]
    pub fn as_u32(self) -> u32 {
        match self {
            SampleRate::Hz44100 => 44_100,
            SampleRate::Hz48000 => 48_000,
            SampleRate::Hz96000 => 96_000,
        }
    }

    /// Map an announced rate, `None` if unsupported
    #[must_use]
    pub fn from_hz(hz: u32) -> Option<Self> {
        [Self::Hz44100, Self::Hz48000, Self::Hz96000]
            .into_iter()
            .find(|rate| rate.as_u32() == hz)
    }
}

/// Channel layout of the decoded stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelConfig {
    /// Mono (1 channel)
    Mono,
    /// Stereo (2 channels)
    #[default]
    Stereo,
}

impl ChannelConfig {
    /// Interleaved samples per frame
    #[must_use]
    pub fn channels(self) -> u8 {
        match self {
            ChannelConfig::Mono => 1,
            ChannelConfig::Stereo => 2,
        }
    }

    /// Create from a channel count
    #[must_use]
    pub fn from_count(count: u8) -> Option<Self> {
        match count {
            1 => Some(ChannelConfig::Mono),
            2 => Some(ChannelConfig::Stereo),
            _ => None,
        }
    }
}

/// PCM layout flowing from the decoder through the queue into a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    /// Sample type
    pub sample_format: SampleFormat,
    /// Frames per second
    pub sample_rate: SampleRate,
    /// Channel layout
    pub channels: ChannelConfig,
}

impl AudioFormat {
    /// 16-bit 44.1 kHz stereo, what senders stream unless `fmtp` says otherwise
    pub const AIRTUNES: Self = Self {
        sample_format: SampleFormat::I16,
        sample_rate: SampleRate::Hz44100,
        channels: ChannelConfig::Stereo,
    };

    /// Create a format
    #[must_use]
    pub fn new(
        sample_format: SampleFormat,
        sample_rate: SampleRate,
        channels: ChannelConfig,
    ) -> Self {
        Self {
            sample_format,
            sample_rate,
            channels,
        }
    }

    /// Bytes of one interleaved frame
    #[must_use]
    pub fn bytes_per_frame(self) -> usize {
        self.sample_format.bytes_per_sample() * usize::from(self.channels.channels())
    }

    /// Play time of `frames`
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn frames_to_duration(self, frames: u64) -> Duration {
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate.as_u32()))
    }

    /// Frames played in `duration`, rounded down
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    #[must_use]
    pub fn duration_to_frames(self, duration: Duration) -> u64 {
        (duration.as_secs_f64() * f64::from(self.sample_rate.as_u32())) as u64
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::AIRTUNES
    }
}

/// What a codec reports once configured from the `fmtp` options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// PCM format the decoder produces
    pub format: AudioFormat,
    /// Frames carried by one RTP audio packet
    pub frames_per_packet: u32,
}

impl FormatInfo {
    /// Number of interleaved samples in one packet
    #[must_use]
    pub fn samples_per_packet(&self) -> usize {
        self.frames_per_packet as usize * usize::from(self.format.channels.channels())
    }
}
