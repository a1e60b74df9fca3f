//! RTP packet model for RAOP audio streaming
//!
//! AirTunes uses RTP framing on three UDP channels (audio, control and
//! timing) with a handful of Apple-specific payload types. All packets
//! share the first four bytes: flags, marker/payload type and a 16-bit
//! sequence number.

mod packet;
mod timing;


pub use packet::{
    AudioPacket, PayloadType, RetransmitRequest, RetransmitResponse, RtpDecodeError, RtpHeader,
    RtpPacket, SyncPacket, TimingPacket,
};
pub use timing::NtpTimestamp;

/// RTP protocol constants for RAOP
pub mod constants {
    /// Audio frames per RTP packet (352 samples at 44.1kHz ≈ 8ms)
    pub const FRAMES_PER_PACKET: u32 = 352;

    /// Audio sample rate
    pub const SAMPLE_RATE: u32 = 44100;

    /// Largest datagram accepted on any channel
    pub const MAX_DATAGRAM: usize = 1500;
}

/// Signed distance from `from` to `to` in 16-bit sequence space
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn seq_delta(from: u16, to: u16) -> i16 {
    to.wrapping_sub(from) as i16
}

/// Signed distance from `from` to `to` in 32-bit timestamp space
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn timestamp_delta(from: u32, to: u32) -> i32 {
    to.wrapping_sub(from) as i32
}
