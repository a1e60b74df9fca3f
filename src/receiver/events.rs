//! Receiver events for UI and application integration

use std::net::SocketAddr;

/// Events emitted by the receiver
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverEvent {
    /// Receiver started listening
    Started {
        /// Receiver name
        name: String,
        /// Listen port
        port: u16,
    },

    /// Receiver stopped
    Stopped,

    /// Client connected
    ClientConnected {
        /// Client address
        address: SocketAddr,
    },

    /// Client disconnected
    ClientDisconnected {
        /// Client address
        address: SocketAddr,
        /// Disconnect reason
        reason: String,
    },

    /// ANNOUNCE negotiated a stream
    StreamAnnounced {
        /// Client address
        address: SocketAddr,
        /// RTP payload format index
        format_index: u32,
        /// Whether the audio is AES encrypted
        encrypted: bool,
    },

    /// RECORD received
    StreamStarted {
        /// Client address
        address: SocketAddr,
    },

    /// FLUSH received
    StreamFlushed {
        /// Client address
        address: SocketAddr,
    },

    /// Volume changed
    VolumeChanged {
        /// Gain in dB after clamping
        db: f32,
    },

    /// Lost packets were given up on
    PacketsAbandoned {
        /// Sequence numbers that will not be retransmitted
        sequences: Vec<u16>,
    },

    /// Audio pipeline torn down
    SessionReset {
        /// Client address
        address: SocketAddr,
    },
}
