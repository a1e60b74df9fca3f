//! Clock synchronization with the sender
//!
//! NTP-style exchange on the timing channel: the receiver stamps requests
//! with output-clock time, the sender answers with its own receive and send
//! times and the round-trip-corrected offset maps sender time onto the
//! output timeline. Sync packets on the control channel then say which RTP
//! timestamp plays at which sender time.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::audio::{AudioOutputQueue, OutputClock};
use crate::protocol::rtp::{NtpTimestamp, SyncPacket, TimingPacket};

/// Tracks the offset between the sender clock and the output clock
pub struct TimingSynchronizer {
    clock: Arc<dyn OutputClock>,
    sequence: u16,
    /// Send time of the request still waiting for an answer
    pending: Option<NtpTimestamp>,
    /// Sender time minus output time, in seconds
    offset: Option<f64>,
}

impl TimingSynchronizer {
    /// Create a synchronizer reading local time from `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn OutputClock>) -> Self {
        Self {
            clock,
            sequence: 0,
            pending: None,
            offset: None,
        }
    }

    /// Latest offset, if any exchange has completed
    #[must_use]
    pub fn offset(&self) -> Option<f64> {
        self.offset
    }

    /// Build the next timing request
    pub fn request(&mut self) -> TimingPacket {
        if self.pending.is_some() {
            warn!(
                offset = ?self.offset,
                "No timing response from sender, keeping previous clock offset"
            );
        }

        let now = NtpTimestamp::from_secs_f64(self.clock.now_secs());
        self.sequence = self.sequence.wrapping_add(1);
        self.pending = Some(now);
        trace!(seq = self.sequence, "Sending timing request");
        TimingPacket::request(self.sequence, now)
    }

    /// Update the offset from the sender's answer to one of our requests
    ///
    /// Returns the new offset, or `None` if the response does not answer the
    /// outstanding request.
    pub fn on_response(&mut self, response: &TimingPacket) -> Option<f64> {
        if self.pending != Some(response.reference_time) {
            debug!(
                seq = response.header.sequence,
                "Ignoring timing response to an unknown request"
            );
            return None;
        }
        self.pending = None;

        let sent = response.reference_time.to_secs_f64();
        let remote_received = response.received_time.to_secs_f64();
        let remote_sent = response.send_time.to_secs_f64();
        let received = self.clock.now_secs();

        let offset = ((remote_received - sent) + (remote_sent - received)) / 2.0;
        debug!(
            offset,
            round_trip = (received - sent) - (remote_sent - remote_received),
            "Clock offset updated"
        );
        self.offset = Some(offset);
        Some(offset)
    }

    /// Answer a timing request from the sender
    #[must_use]
    pub fn on_request(&self, request: &TimingPacket) -> TimingPacket {
        let now = NtpTimestamp::from_secs_f64(self.clock.now_secs());
        TimingPacket::response_to(request, now, now)
    }

    /// Anchor the output timeline from a sync packet
    ///
    /// Without a known offset only the first sync after RECORD or FLUSH is
    /// used, and it is placed right after whatever is already queued.
    /// Returns whether the queue was re-anchored.
    pub fn on_sync(&self, sync: &SyncPacket, queue: &AudioOutputQueue) -> bool {
        match self.offset {
            Some(offset) => {
                let local = sync.ntp_time.to_secs_f64() - offset;
                queue.set_anchor(sync.timestamp_minus_latency, local);
                true
            }
            None if sync.is_first() => {
                queue.set_anchor(sync.timestamp_minus_latency, queue.next_free_secs());
                true
            }
            None => {
                trace!(
                    timestamp = sync.timestamp_minus_latency,
                    "No clock offset yet, ignoring sync"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for TimingSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimingSynchronizer")
            .field("sequence", &self.sequence)
            .field("pending", &self.pending)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}
