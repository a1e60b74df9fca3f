//! AirTunes receiver
//!
//! The [`RaopReceiver`] accepts RTSP connections, each driven by an
//! [`RtspSession`] that negotiates a stream, opens the RTP channels and
//! feeds packets through an [`AudioPipeline`] into the output queue.

pub mod challenge;
pub mod channels;
pub mod config;
pub mod events;
pub mod pipeline;
pub mod retransmit;
pub mod server;
pub mod session;
pub mod timing;
pub mod track;

#[cfg(test)]
mod tests;

pub use channels::Channel;
pub use config::{ReceiverConfig, format_hardware_address};
pub use events::ReceiverEvent;
pub use pipeline::{AudioPipeline, PipelineItem, StageOutput};
pub use retransmit::{RetransmitConfig, RetransmitTracker, TrackerStats, TrackerUpdate};
pub use server::{RaopReceiver, ReceiverState};
pub use session::{Reply, RtspSession, SessionContext, SessionPhase, StreamInfo};
pub use timing::TimingSynchronizer;
pub use track::{Artwork, CurrentTrack, TrackInfo, TrackSnapshot};
