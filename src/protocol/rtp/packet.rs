use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::timing::NtpTimestamp;

#[derive(Debug, Error)]
pub enum RtpDecodeError {
    #[error("buffer too small: need {needed}, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    #[error("invalid RTP version: {0}")]
    InvalidVersion(u8),

    #[error("unknown payload type: {0:#04x}")]
    UnknownPayloadType(u8),
}

/// RAOP RTP payload types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadType {
    /// Timing request (either direction, timing channel)
    TimingRequest = 0x52,
    /// Timing response (either direction, timing channel)
    TimingResponse = 0x53,
    /// Sync packet (sender -> receiver, control channel)
    Sync = 0x54,
    /// Retransmit request (receiver -> sender, control channel)
    RetransmitRequest = 0x55,
    /// Retransmit response (sender -> receiver, control channel)
    RetransmitResponse = 0x56,
    /// Audio data (realtime mode)
    AudioRealtime = 0x60,
    /// Audio data (buffered mode)
    AudioBuffered = 0x61,
}

impl PayloadType {
    /// Parse from byte value, ignoring the marker bit
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x7F {
            0x52 => Some(Self::TimingRequest),
            0x53 => Some(Self::TimingResponse),
            0x54 => Some(Self::Sync),
            0x55 => Some(Self::RetransmitRequest),
            0x56 => Some(Self::RetransmitResponse),
            0x60 => Some(Self::AudioRealtime),
            0x61 => Some(Self::AudioBuffered),
            _ => None,
        }
    }
}

/// The four bytes every RAOP packet starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Extension flag (on sync packets: first sync after RECORD/FLUSH)
    pub extension: bool,
    /// Marker bit
    pub marker: bool,
    /// Payload type (7 bits)
    pub payload_type: u8,
    /// Sequence number (16 bits, wraps)
    pub sequence: u16,
}

impl RtpHeader {
    /// Header size
    pub const SIZE: usize = 4;

    /// RTP version carried in the top two bits
    const VERSION: u8 = 2;

    /// Create a header with the marker bit set, as receivers send them
    #[must_use]
    pub fn new(payload_type: PayloadType, sequence: u16) -> Self {
        Self {
            extension: false,
            marker: true,
            payload_type: payload_type as u8,
            sequence,
        }
    }

    /// Decode from the start of `buf`
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` if the buffer is too small or the version
    /// is not 2.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        check_len(buf, Self::SIZE)?;

        let version = buf[0] >> 6;
        if version != Self::VERSION {
            return Err(RtpDecodeError::InvalidVersion(version));
        }

        Ok(Self {
            extension: (buf[0] & 0x10) != 0,
            marker: (buf[1] & 0x80) != 0,
            payload_type: buf[1] & 0x7F,
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
        })
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8((Self::VERSION << 6) | if self.extension { 0x10 } else { 0x00 });
        buf.put_u8(self.payload_type | if self.marker { 0x80 } else { 0x00 });
        buf.put_u16(self.sequence);
    }
}

/// Audio data packet (payload types 0x60 and 0x61)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPacket {
    /// Common header
    pub header: RtpHeader,
    /// RTP timestamp of the first frame in the payload
    pub timestamp: u32,
    /// Synchronization source
    pub ssrc: u32,
    /// Audio payload (possibly encrypted, possibly compressed)
    pub payload: Bytes,
}

impl AudioPacket {
    /// Size of header, timestamp and SSRC
    pub const HEADER_SIZE: usize = 12;

    /// Create a realtime audio packet
    #[must_use]
    pub fn new(sequence: u16, timestamp: u32, ssrc: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            header: RtpHeader {
                extension: false,
                marker: false,
                payload_type: PayloadType::AudioRealtime as u8,
                sequence,
            },
            timestamp,
            ssrc,
            payload: payload.into(),
        }
    }

    /// Sequence number
    #[must_use]
    pub fn sequence(&self) -> u16 {
        self.header.sequence
    }

    fn decode(header: RtpHeader, data: &Bytes) -> Result<Self, RtpDecodeError> {
        check_len(data, Self::HEADER_SIZE)?;

        Ok(Self {
            header,
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            payload: data.slice(Self::HEADER_SIZE..),
        })
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        self.header.encode_into(buf);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        buf.put_slice(&self.payload);
    }
}

/// Timing request or response (payload types 0x52 and 0x53)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingPacket {
    /// Common header
    pub header: RtpHeader,
    /// Send time of the request this answers (zero in requests)
    pub reference_time: NtpTimestamp,
    /// Time the request was received (zero in requests)
    pub received_time: NtpTimestamp,
    /// Time this packet was sent
    pub send_time: NtpTimestamp,
}

impl TimingPacket {
    /// Packet size
    pub const SIZE: usize = 32;

    /// Create a timing request stamped with `send_time`
    #[must_use]
    pub fn request(sequence: u16, send_time: NtpTimestamp) -> Self {
        Self {
            header: RtpHeader::new(PayloadType::TimingRequest, sequence),
            reference_time: NtpTimestamp::default(),
            received_time: NtpTimestamp::default(),
            send_time,
        }
    }

    /// Create the response to `request`
    #[must_use]
    pub fn response_to(
        request: &TimingPacket,
        received_time: NtpTimestamp,
        send_time: NtpTimestamp,
    ) -> Self {
        Self {
            header: RtpHeader::new(PayloadType::TimingResponse, request.header.sequence),
            reference_time: request.send_time,
            received_time,
            send_time,
        }
    }

    fn decode(header: RtpHeader, data: &[u8]) -> Result<Self, RtpDecodeError> {
        check_len(data, Self::SIZE)?;

        Ok(Self {
            header,
            reference_time: NtpTimestamp::decode(&data[8..16]),
            received_time: NtpTimestamp::decode(&data[16..24]),
            send_time: NtpTimestamp::decode(&data[24..32]),
        })
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        self.header.encode_into(buf);
        buf.put_u32(0);
        buf.put_slice(&self.reference_time.encode());
        buf.put_slice(&self.received_time.encode());
        buf.put_slice(&self.send_time.encode());
    }
}

/// Sync packet (payload type 0x54)
///
/// Ties an RTP timestamp to the sender's NTP clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPacket {
    /// Common header
    pub header: RtpHeader,
    /// RTP timestamp to be played at `ntp_time`
    pub timestamp_minus_latency: u32,
    /// Sender time at which `timestamp_minus_latency` plays
    pub ntp_time: NtpTimestamp,
    /// RTP timestamp the sender is currently sending
    pub timestamp: u32,
}

impl SyncPacket {
    /// Packet size
    pub const SIZE: usize = 20;

    /// Create a sync packet
    #[must_use]
    pub fn new(
        timestamp_minus_latency: u32,
        ntp_time: NtpTimestamp,
        timestamp: u32,
        is_first: bool,
    ) -> Self {
        let mut header = RtpHeader::new(PayloadType::Sync, 7);
        header.extension = is_first;
        Self {
            header,
            timestamp_minus_latency,
            ntp_time,
            timestamp,
        }
    }

    /// Whether this is the first sync after RECORD or FLUSH
    #[must_use]
    pub fn is_first(&self) -> bool {
        self.header.extension
    }

    fn decode(header: RtpHeader, data: &[u8]) -> Result<Self, RtpDecodeError> {
        check_len(data, Self::SIZE)?;

        Ok(Self {
            header,
            timestamp_minus_latency: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ntp_time: NtpTimestamp::decode(&data[8..16]),
            timestamp: u32::from_be_bytes([data[16], data[17], data[18], data[19]]),
        })
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        self.header.encode_into(buf);
        buf.put_u32(self.timestamp_minus_latency);
        buf.put_slice(&self.ntp_time.encode());
        buf.put_u32(self.timestamp);
    }
}

/// Retransmit request (payload type 0x55)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitRequest {
    /// Common header
    pub header: RtpHeader,
    /// First sequence number to retransmit
    pub first_sequence: u16,
    /// Number of packets to retransmit
    pub count: u16,
}

impl RetransmitRequest {
    /// Packet size
    pub const SIZE: usize = 8;

    /// Create a request for `count` packets starting at `first_sequence`
    #[must_use]
    pub fn new(sequence: u16, first_sequence: u16, count: u16) -> Self {
        Self {
            header: RtpHeader::new(PayloadType::RetransmitRequest, sequence),
            first_sequence,
            count,
        }
    }

    fn decode(header: RtpHeader, data: &[u8]) -> Result<Self, RtpDecodeError> {
        check_len(data, Self::SIZE)?;

        Ok(Self {
            header,
            first_sequence: u16::from_be_bytes([data[4], data[5]]),
            count: u16::from_be_bytes([data[6], data[7]]),
        })
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        self.header.encode_into(buf);
        buf.put_u16(self.first_sequence);
        buf.put_u16(self.count);
    }
}

/// Retransmit response (payload type 0x56): a resent audio packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitResponse {
    /// Common header
    pub header: RtpHeader,
    /// The original audio packet
    pub audio: AudioPacket,
}

impl RetransmitResponse {
    /// Bytes before the embedded audio packet
    pub const PREFIX_SIZE: usize = 4;

    /// Wrap an audio packet for resending
    #[must_use]
    pub fn new(sequence: u16, audio: AudioPacket) -> Self {
        Self {
            header: RtpHeader::new(PayloadType::RetransmitResponse, sequence),
            audio,
        }
    }

    fn decode(header: RtpHeader, data: &Bytes) -> Result<Self, RtpDecodeError> {
        check_len(data, Self::PREFIX_SIZE + AudioPacket::HEADER_SIZE)?;

        let inner = data.slice(Self::PREFIX_SIZE..);
        let audio_header = RtpHeader::decode(&inner)?;

        Ok(Self {
            header,
            audio: AudioPacket::decode(audio_header, &inner)?,
        })
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        self.header.encode_into(buf);
        self.audio.encode_into(buf);
    }
}

/// Any packet seen on the three RAOP channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtpPacket {
    /// Audio data
    Audio(AudioPacket),
    /// Timing request
    TimingRequest(TimingPacket),
    /// Timing response
    TimingResponse(TimingPacket),
    /// Sync
    Sync(SyncPacket),
    /// Retransmit request
    RetransmitRequest(RetransmitRequest),
    /// Retransmit response
    RetransmitResponse(RetransmitResponse),
    /// Raw datagram that could not be decoded
    Unknown(Bytes),
}

impl RtpPacket {
    /// Decode a datagram
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` for truncated packets, wrong RTP versions and
    /// payload types RAOP does not define.
    pub fn decode(data: Bytes) -> Result<Self, RtpDecodeError> {
        let header = RtpHeader::decode(&data)?;

        let payload_type = PayloadType::from_byte(header.payload_type)
            .ok_or(RtpDecodeError::UnknownPayloadType(header.payload_type))?;

        Ok(match payload_type {
            PayloadType::AudioRealtime | PayloadType::AudioBuffered => {
                Self::Audio(AudioPacket::decode(header, &data)?)
            }
            PayloadType::TimingRequest => Self::TimingRequest(TimingPacket::decode(header, &data)?),
            PayloadType::TimingResponse => {
                Self::TimingResponse(TimingPacket::decode(header, &data)?)
            }
            PayloadType::Sync => Self::Sync(SyncPacket::decode(header, &data)?),
            PayloadType::RetransmitRequest => {
                Self::RetransmitRequest(RetransmitRequest::decode(header, &data)?)
            }
            PayloadType::RetransmitResponse => {
                Self::RetransmitResponse(RetransmitResponse::decode(header, &data)?)
            }
        })
    }

    /// Encode to bytes
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());

        match self {
            Self::Audio(p) => p.encode_into(&mut buf),
            Self::TimingRequest(p) | Self::TimingResponse(p) => p.encode_into(&mut buf),
            Self::Sync(p) => p.encode_into(&mut buf),
            Self::RetransmitRequest(p) => p.encode_into(&mut buf),
            Self::RetransmitResponse(p) => p.encode_into(&mut buf),
            Self::Unknown(raw) => buf.put_slice(raw),
        }

        buf.freeze()
    }

    fn encoded_len(&self) -> usize {
        match self {
            Self::Audio(p) => AudioPacket::HEADER_SIZE + p.payload.len(),
            Self::TimingRequest(_) | Self::TimingResponse(_) => TimingPacket::SIZE,
            Self::Sync(_) => SyncPacket::SIZE,
            Self::RetransmitRequest(_) => RetransmitRequest::SIZE,
            Self::RetransmitResponse(p) => {
                RetransmitResponse::PREFIX_SIZE + AudioPacket::HEADER_SIZE + p.audio.payload.len()
            }
            Self::Unknown(raw) => raw.len(),
        }
    }

    /// Short name for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Audio(_) => "audio",
            Self::TimingRequest(_) => "timing-request",
            Self::TimingResponse(_) => "timing-response",
            Self::Sync(_) => "sync",
            Self::RetransmitRequest(_) => "retransmit-request",
            Self::RetransmitResponse(_) => "retransmit-response",
            Self::Unknown(_) => "unknown",
        }
    }
}

fn check_len(buf: &[u8], needed: usize) -> Result<(), RtpDecodeError> {
    if buf.len() < needed {
        return Err(RtpDecodeError::BufferTooSmall {
            needed,
            have: buf.len(),
        });
    }
    Ok(())
}
