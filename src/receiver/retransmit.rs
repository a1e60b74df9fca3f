//! Lost packet detection and retransmit requests
//!
//! Tracks the highest contiguous sequence number and every missing sequence
//! above it. Missing sequences are requested from the sender on the control
//! channel, re-requested a bounded number of times and finally given up on
//! so playback never stalls waiting for them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::audio::OutputClock;
use crate::protocol::rtp::{RetransmitRequest, seq_delta};

/// Retransmit tuning
#[derive(Debug, Clone)]
pub struct RetransmitConfig {
    /// Age after which a missing packet is abandoned
    pub gap_timeout: Duration,
    /// Delay before a missing packet is requested again
    pub retry_interval: Duration,
    /// Re-requests per missing packet after the first request
    pub max_retries: u32,
    /// Packets covered by one request
    pub max_run: u16,
    /// Jumps larger than this are treated as a new stream, not as loss
    pub max_gap: u16,
}

impl Default for RetransmitConfig {
    fn default() -> Self {
        Self {
            gap_timeout: Duration::from_millis(1500),
            retry_interval: Duration::from_millis(300),
            // Zero sends exactly one request per missing packet
            max_retries: 2,
            max_run: 128,
            max_gap: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Gap {
    detected_at: f64,
    requested_at: f64,
    retries: u32,
}

/// What the tracker wants done after an observation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrackerUpdate {
    /// Requests to send on the control channel
    pub requests: Vec<RetransmitRequest>,
    /// Sequences given up on
    pub abandoned: Vec<u16>,
}

impl TrackerUpdate {
    /// Check if nothing needs to be done
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.abandoned.is_empty()
    }

    fn merge(&mut self, other: TrackerUpdate) {
        self.requests.extend(other.requests);
        self.abandoned.extend(other.abandoned);
    }
}

/// Statistics for sequence tracking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Packets observed
    pub packets_received: u64,
    /// Sequences ever found missing
    pub total_missing: u64,
    /// Missing sequences that arrived later
    pub recovered: u64,
    /// Missing sequences given up on
    pub abandoned: u64,
}

/// Tracks RTP sequence numbers and requests retransmission of gaps
pub struct RetransmitTracker {
    config: RetransmitConfig,
    clock: Arc<dyn OutputClock>,
    /// Highest sequence with everything before it received or abandoned
    contiguous: Option<u16>,
    /// Highest sequence received
    highest: Option<u16>,
    gaps: HashMap<u16, Gap>,
    request_sequence: u16,
    stats: TrackerStats,
}

impl RetransmitTracker {
    /// Create a tracker reading time from `clock`
    #[must_use]
    pub fn new(config: RetransmitConfig, clock: Arc<dyn OutputClock>) -> Self {
        Self {
            config,
            clock,
            contiguous: None,
            highest: None,
            gaps: HashMap::new(),
            request_sequence: 0,
            stats: TrackerStats::default(),
        }
    }

    /// Highest contiguous sequence number
    #[must_use]
    pub fn contiguous(&self) -> Option<u16> {
        self.contiguous
    }

    /// Sequences currently awaited, in stream order
    #[must_use]
    pub fn missing(&self) -> Vec<u16> {
        let mut missing: Vec<u16> = self.gaps.keys().copied().collect();
        if let Some(base) = self.contiguous {
            missing.sort_by_key(|&seq| seq_delta(base, seq));
        }
        missing
    }

    /// Get statistics
    #[must_use]
    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Record an arriving audio packet
    pub fn on_packet(&mut self, seq: u16) -> TrackerUpdate {
        self.stats.packets_received += 1;
        let now = self.clock.now_secs();

        let (Some(highest), Some(_)) = (self.highest, self.contiguous) else {
            self.highest = Some(seq);
            self.contiguous = Some(seq);
            return TrackerUpdate::default();
        };

        let mut update = TrackerUpdate::default();
        let ahead = seq_delta(highest, seq);

        if ahead > 0 && ahead.unsigned_abs() > self.config.max_gap {
            warn!(seq, highest, "Sequence jumped, restarting loss tracking");
            self.restart(seq);
            return update;
        }

        if ahead > 1 {
            let first = highest.wrapping_add(1);
            let count = ahead.unsigned_abs() - 1;
            for offset in 0..count {
                self.gaps.insert(
                    first.wrapping_add(offset),
                    Gap {
                        detected_at: now,
                        requested_at: now,
                        retries: 0,
                    },
                );
            }
            self.stats.total_missing += u64::from(count);
            debug!(first, count, "Detected missing packets");
            update.requests = self.requests_for_run(first, count);
        }

        if ahead > 0 {
            self.highest = Some(seq);
        } else if self.gaps.remove(&seq).is_some() {
            self.stats.recovered += 1;
            debug!(seq, "Retransmitted packet arrived");
        } else {
            trace!(seq, "Duplicate or late packet");
        }

        self.advance();
        update.merge(self.expire(now));
        update
    }

    /// Re-request and abandon gaps as time passes
    pub fn poll(&mut self) -> TrackerUpdate {
        let now = self.clock.now_secs();
        let mut update = self.expire(now);

        let retry_after = self.config.retry_interval.as_secs_f64();
        let mut due: Vec<u16> = self
            .gaps
            .iter_mut()
            .filter(|(_, gap)| {
                gap.retries < self.config.max_retries && now - gap.requested_at >= retry_after
            })
            .map(|(&seq, gap)| {
                gap.retries += 1;
                gap.requested_at = now;
                seq
            })
            .collect();

        if let Some(base) = self.contiguous {
            due.sort_by_key(|&seq| seq_delta(base, seq));
        }
        for (first, count) in runs(&due) {
            debug!(first, count, "Re-requesting missing packets");
            update.requests.extend(self.requests_for_run(first, count));
        }

        update
    }

    /// Forget all state, e.g. after FLUSH
    pub fn reset(&mut self) {
        self.contiguous = None;
        self.highest = None;
        self.gaps.clear();
    }

    fn restart(&mut self, seq: u16) {
        self.gaps.clear();
        self.contiguous = Some(seq);
        self.highest = Some(seq);
    }

    /// Abandon gaps older than the timeout, each reported exactly once
    fn expire(&mut self, now: f64) -> TrackerUpdate {
        let timeout = self.config.gap_timeout.as_secs_f64();
        let mut abandoned: Vec<u16> = self
            .gaps
            .iter()
            .filter(|(_, gap)| now - gap.detected_at > timeout)
            .map(|(&seq, _)| seq)
            .collect();

        if abandoned.is_empty() {
            return TrackerUpdate::default();
        }

        for seq in &abandoned {
            self.gaps.remove(seq);
        }
        if let Some(base) = self.contiguous {
            abandoned.sort_by_key(|&seq| seq_delta(base, seq));
        }
        self.stats.abandoned += abandoned.len() as u64;
        info!(count = abandoned.len(), first = abandoned[0], "Giving up on lost packets");

        self.advance();
        TrackerUpdate {
            requests: Vec::new(),
            abandoned,
        }
    }

    /// Move the watermark over everything that is no longer missing
    fn advance(&mut self) {
        let (Some(mut contiguous), Some(highest)) = (self.contiguous, self.highest) else {
            return;
        };
        while seq_delta(contiguous, highest) > 0 {
            let next = contiguous.wrapping_add(1);
            if self.gaps.contains_key(&next) {
                break;
            }
            contiguous = next;
        }
        self.contiguous = Some(contiguous);
    }

    fn requests_for_run(&mut self, first: u16, count: u16) -> Vec<RetransmitRequest> {
        let max_run = self.config.max_run.max(1);
        let mut requests = Vec::new();
        let mut offset = 0;
        while offset < count {
            let chunk = (count - offset).min(max_run);
            requests.push(RetransmitRequest::new(
                self.request_sequence,
                first.wrapping_add(offset),
                chunk,
            ));
            self.request_sequence = self.request_sequence.wrapping_add(1);
            offset += chunk;
        }
        requests
    }
}

impl std::fmt::Debug for RetransmitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetransmitTracker")
            .field("contiguous", &self.contiguous)
            .field("highest", &self.highest)
            .field("missing", &self.gaps.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Group sequences already in stream order into `(first, count)` runs
fn runs(sequences: &[u16]) -> Vec<(u16, u16)> {
    let mut runs: Vec<(u16, u16)> = Vec::new();
    for &seq in sequences {
        match runs.last_mut() {
            Some((first, count)) if first.wrapping_add(*count) == seq => *count += 1,
            _ => runs.push((seq, 1)),
        }
    }
    runs
}
