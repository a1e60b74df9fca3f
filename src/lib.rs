//! # raop-receiver
//!
//! A pure Rust `AirTunes` (RAOP) audio receiver: the speaker side of the
//! protocol iTunes and `AirPort Express` senders speak.
//!
//! ## Features
//!
//! - RTSP session handling with `Apple-Challenge` authentication
//! - RSA/AES encrypted audio streams
//! - Apple Lossless and PCM decoding
//! - Lost packet retransmission and clock synchronization
//! - Volume, track metadata and cover art
//! - Service advertisement via mDNS
//!
//! ## Example
//!
//! ```rust,no_run
//! use raop_receiver::{RaopReceiver, ReceiverConfig, ReceiverEvent};
//!
//! # async fn example() -> Result<(), raop_receiver::ReceiverError> {
//! let mut receiver = RaopReceiver::new(ReceiverConfig::with_name("Living Room"));
//! let mut events = receiver.subscribe();
//!
//! receiver.start().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let ReceiverEvent::VolumeChanged { db } = event {
//!         println!("volume {db} dB");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **Receiver**: [`RaopReceiver`] - listener, sessions and RTP channels
//! - **Audio**: decoders, the output queue and sinks
//! - **Protocol**: sans-IO RTSP, SDP, RTP, DMAP and crypto

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;

/// Testing utilities
pub mod testing;

pub mod audio;
pub mod discovery;
pub mod protocol;
pub mod receiver;

// Re-exports
pub use audio::{AudioFormat, AudioSink, CaptureSink, NullSink};
pub use discovery::{RaopAdvertiser, RaopCapabilities};
pub use error::{ReceiverError, SessionError};
pub use receiver::{
    CurrentTrack, RaopReceiver, ReceiverConfig, ReceiverEvent, ReceiverState, TrackInfo,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::{
        AudioFormat, AudioSink, CurrentTrack, RaopReceiver, ReceiverConfig, ReceiverError,
        ReceiverEvent, ReceiverState, TrackInfo,
    };
}
