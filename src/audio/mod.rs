//! Audio handling module
//!
//! Everything between a decrypted RTP payload and the speaker: the codec
//! adapter, the timestamp-ordered output queue and the sinks it drains into.

#[cfg(feature = "decoders")]
pub mod alac;
pub mod codec;
pub mod format;
#[cfg(feature = "audio-cpal")]
pub mod output_cpal;
pub mod queue;
pub mod sink;

#[cfg(test)]
mod tests;

#[cfg(feature = "decoders")]
pub use alac::AlacDecoder;
pub use codec::{
    AudioDecoder, CodecError, CodecFactory, PcmDecoder, default_codec_factory, pcm_codec_factory,
};
pub use format::{AudioFormat, ChannelConfig, FormatInfo, SampleFormat, SampleRate};
#[cfg(feature = "audio-cpal")]
pub use output_cpal::CpalSink;
pub use queue::{AudioOutputQueue, OutputClock, QueueConfig};
pub use sink::{
    AudioSink, CaptureLog, CaptureSink, GainRange, NullSink, SinkError, SinkFactory,
    SinkInterrupt, default_sink_factory,
};
