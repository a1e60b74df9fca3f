//! Apple Lossless decoding through symphonia

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Channels, Signal};
use symphonia::core::codecs::{CODEC_TYPE_ALAC, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::conv::IntoSample;
use symphonia::core::formats::Packet;
use symphonia::core::sample::Sample;

use super::codec::{AudioDecoder, CodecError};
use super::format::{AudioFormat, ChannelConfig, FormatInfo, SampleFormat, SampleRate};
use crate::protocol::sdp::{APPLE_LOSSLESS, AlacParameters};

/// ALAC decoder configured from the `fmtp` line
#[derive(Default)]
pub struct AlacDecoder {
    decoder: Option<Box<dyn Decoder>>,
    channels: usize,
    frames_decoded: u64,
}

impl AlacDecoder {
    /// Create an unconfigured decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for AlacDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlacDecoder")
            .field("configured", &self.decoder.is_some())
            .field("frames_decoded", &self.frames_decoded)
            .finish()
    }
}

impl AudioDecoder for AlacDecoder {
    fn encoding_name(&self) -> &'static str {
        APPLE_LOSSLESS
    }

    fn configure(&mut self, options: &[String]) -> Result<FormatInfo, CodecError> {
        let params = AlacParameters::parse(options)
            .map_err(|e| CodecError::InvalidConfiguration(e.to_string()))?;

        let sample_rate = SampleRate::from_hz(params.sample_rate)
            .ok_or_else(|| CodecError::UnsupportedFormat(format!("{} Hz", params.sample_rate)))?;
        let channels = ChannelConfig::from_count(params.channels).ok_or_else(|| {
            CodecError::UnsupportedFormat(format!("{} channels", params.channels))
        })?;
        let layout = match channels {
            ChannelConfig::Mono => Channels::FRONT_CENTRE,
            ChannelConfig::Stereo => Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
        };

        let mut codec_params = CodecParameters::new();
        codec_params
            .for_codec(CODEC_TYPE_ALAC)
            .with_sample_rate(params.sample_rate)
            .with_channels(layout)
            .with_bits_per_coded_sample(u32::from(params.bit_depth))
            .with_max_frames_per_packet(u64::from(params.frames_per_packet))
            .with_extra_data(params.to_magic_cookie().to_vec().into_boxed_slice());

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| CodecError::InvalidConfiguration(e.to_string()))?;

        tracing::debug!(
            rate = params.sample_rate,
            channels = params.channels,
            bit_depth = params.bit_depth,
            frames_per_packet = params.frames_per_packet,
            "Configured ALAC decoder"
        );

        self.decoder = Some(decoder);
        self.channels = usize::from(channels.channels());
        self.frames_decoded = 0;

        Ok(FormatInfo {
            format: AudioFormat::new(SampleFormat::I16, sample_rate, channels),
            frames_per_packet: params.frames_per_packet,
        })
    }

    fn decode(&mut self, frame: &[u8]) -> Result<Vec<i16>, CodecError> {
        let decoder = self.decoder.as_mut().ok_or(CodecError::NotConfigured)?;

        let packet = Packet::new_from_slice(0, self.frames_decoded, 0, frame);
        let decoded = decoder
            .decode(&packet)
            .map_err(|e| CodecError::Decode(e.to_string()))?;

        let mut samples = Vec::with_capacity(decoded.frames() * decoded.spec().channels.count());
        match decoded {
            AudioBufferRef::S16(buf) => {
                let channels = buf.spec().channels.count();
                for frame in 0..buf.frames() {
                    for channel in 0..channels {
                        samples.push(buf.chan(channel)[frame]);
                    }
                }
            }
            AudioBufferRef::S32(buf) => interleave(&buf, &mut samples),
            AudioBufferRef::F32(buf) => interleave(&buf, &mut samples),
            _ => {
                return Err(CodecError::Decode("unexpected ALAC sample format".into()));
            }
        }

        self.frames_decoded += (samples.len() / self.channels.max(1)) as u64;

        Ok(samples)
    }
}

fn interleave<S>(buf: &AudioBuffer<S>, out: &mut Vec<i16>)
where
    S: Sample + IntoSample<i16>,
{
    let channels = buf.spec().channels.count();
    for frame in 0..buf.frames() {
        for channel in 0..channels {
            out.push(buf.chan(channel)[frame].into_sample());
        }
    }
}
