//! Timestamp-ordered audio output queue
//!
//! Decoded frames are kept in a map keyed by their (unwrapped) RTP timestamp
//! and handed to the sink by a dedicated drain thread once their playback
//! time has come. The queue owns the local output timeline: everything that
//! needs "now" in sink time asks the queue through [`OutputClock`].

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::format::FormatInfo;
use super::sink::{AudioSink, GainRange, SinkError, SinkInterrupt};
use crate::protocol::rtp::timestamp_delta;

/// Source of local output time
pub trait OutputClock: Send + Sync {
    /// Seconds elapsed on the output timeline
    fn now_secs(&self) -> f64;
}

/// Output queue tuning
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Delay between the first frame arriving and it being played, when no
    /// sync packet anchored the timeline
    pub start_latency: Duration,
    /// Maximum audio held in the queue
    pub max_buffered: Duration,
    /// Upper bound on how long the drain thread sleeps
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            start_latency: Duration::from_millis(2000),
            max_buffered: Duration::from_secs(10),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Maps a stream timestamp to a point on the output timeline
#[derive(Debug, Clone, Copy, PartialEq)]
struct Anchor {
    timestamp: u64,
    secs: f64,
}

#[derive(Debug)]
struct QueueState {
    frames: BTreeMap<u64, Vec<i16>>,
    buffered_frames: u64,
    anchor: Option<Anchor>,
    /// Last unwrapped timestamp, the reference for unwrapping the next one
    reference: Option<u64>,
    /// End of the last frame handed to the sink
    played_until: Option<u64>,
    /// End of the latest frame ever enqueued
    highest_end: Option<u64>,
    /// Frames ending at or before this were flushed
    floor: Option<u64>,
    gain_db: f32,
    gain_changed: bool,
    closed: bool,
}

impl QueueState {
    /// Extend a 32-bit RTP timestamp onto a monotonic 64-bit timeline
    #[allow(clippy::cast_possible_truncation)]
    fn unwrap_timestamp(&mut self, timestamp: u32) -> u64 {
        let unwrapped = match self.reference {
            // Start one wrap in so that timestamps slightly before the first
            // one stay representable.
            None => (1u64 << 32) | u64::from(timestamp),
            Some(reference) => {
                let delta = timestamp_delta(reference as u32, timestamp);
                reference.saturating_add_signed(i64::from(delta))
            }
        };
        self.reference = Some(unwrapped);
        unwrapped
    }
}

struct Shared {
    state: Mutex<QueueState>,
    wake: Condvar,
    epoch: Instant,
    info: FormatInfo,
    gain_range: GainRange,
    config: QueueConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn rate(&self) -> f64 {
        f64::from(self.info.format.sample_rate.as_u32())
    }

    fn channels(&self) -> usize {
        usize::from(self.info.format.channels.channels())
    }

    #[allow(clippy::cast_precision_loss)]
    fn due_secs(&self, anchor: Anchor, timestamp: u64) -> f64 {
        let frames = timestamp as f64 - anchor.timestamp as f64;
        anchor.secs + frames / self.rate()
    }
}

/// Timestamp-ordered buffer in front of an [`AudioSink`]
pub struct AudioOutputQueue {
    shared: Arc<Shared>,
    interrupt: Option<SinkInterrupt>,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl AudioOutputQueue {
    /// Open `sink` and start the drain thread
    ///
    /// # Errors
    /// Returns `SinkError` if the sink rejects the format.
    pub fn new(
        info: FormatInfo,
        mut sink: Box<dyn AudioSink>,
        config: QueueConfig,
    ) -> Result<Self, SinkError> {
        sink.open(info.format)?;
        let gain_range = sink.gain_range();
        let interrupt = sink.interrupt();

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                frames: BTreeMap::new(),
                buffered_frames: 0,
                anchor: None,
                reference: None,
                played_until: None,
                highest_end: None,
                floor: None,
                gain_db: gain_range.max_db,
                gain_changed: false,
                closed: false,
            }),
            wake: Condvar::new(),
            epoch: Instant::now(),
            info,
            gain_range,
            config,
        });

        let drain_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("raop-output".into())
            .spawn(move || drain_loop(&drain_shared, sink))
            .map_err(|e| SinkError::StreamError(e.to_string()))?;

        Ok(Self {
            shared,
            interrupt,
            drain: Mutex::new(Some(handle)),
        })
    }

    /// Format the queue was built for
    #[must_use]
    pub fn format_info(&self) -> FormatInfo {
        self.shared.info
    }

    /// Queue interleaved samples for playback at `timestamp`
    ///
    /// Returns `false` if the frame was dropped because it is older than
    /// what was already played or flushed, or the queue is full.
    pub fn enqueue(&self, timestamp: u32, samples: Vec<i16>) -> bool {
        let shared = &self.shared;
        let frames = (samples.len() / shared.channels().max(1)) as u64;
        if frames == 0 {
            return false;
        }

        let mut state = shared.lock();
        if state.closed {
            return false;
        }

        let key = state.unwrap_timestamp(timestamp);
        let end = key + frames;

        if state.floor.is_some_and(|floor| end <= floor) {
            debug!(timestamp, "Dropping frame from before flush");
            return false;
        }
        if state.played_until.is_some_and(|played| end <= played) {
            debug!(timestamp, "Dropping frame that arrived after its playback time");
            return false;
        }

        let capacity = shared.info.format.duration_to_frames(shared.config.max_buffered);
        if state.buffered_frames + frames > capacity {
            warn!(
                timestamp,
                buffered = state.buffered_frames,
                "Output queue full, dropping frame"
            );
            return false;
        }

        if state.anchor.is_none() {
            let secs = shared.now_secs() + shared.config.start_latency.as_secs_f64();
            state.anchor = Some(Anchor {
                timestamp: key,
                secs,
            });
            debug!(timestamp, at = secs, "Anchored output timeline at first frame");
        }

        if let Some(previous) = state.frames.insert(key, samples) {
            let previous = (previous.len() / shared.channels().max(1)) as u64;
            state.buffered_frames -= previous;
        }
        state.buffered_frames += frames;
        state.highest_end = Some(state.highest_end.map_or(end, |h| h.max(end)));
        drop(state);

        trace!(timestamp, frames, "Enqueued frame");
        shared.wake.notify_one();
        true
    }

    /// Play `timestamp` at `local_secs` on the output timeline
    pub fn set_anchor(&self, timestamp: u32, local_secs: f64) {
        let mut state = self.shared.lock();
        let key = state.unwrap_timestamp(timestamp);
        state.anchor = Some(Anchor {
            timestamp: key,
            secs: local_secs,
        });
        drop(state);

        debug!(timestamp, at = local_secs, "Re-anchored output timeline");
        self.shared.wake.notify_one();
    }

    /// Output time at which audio following everything queued would play
    #[must_use]
    pub fn next_free_secs(&self) -> f64 {
        let shared = &self.shared;
        let state = shared.lock();
        let now = shared.now_secs();

        match (state.anchor, state.highest_end.max(state.played_until)) {
            (Some(anchor), Some(end)) => shared.due_secs(anchor, end).max(now),
            _ => now + shared.config.start_latency.as_secs_f64(),
        }
    }

    /// Discard all queued frames and forget the timeline anchor
    ///
    /// Frames that end at or before the latest frame seen so far are
    /// rejected afterwards.
    pub fn flush(&self) {
        let mut state = self.shared.lock();
        let floor = state.highest_end.max(state.played_until);
        state.floor = floor.max(state.floor);
        state.frames.clear();
        state.buffered_frames = 0;
        state.anchor = None;
        drop(state);

        debug!(?floor, "Flushed output queue");
        self.shared.wake.notify_one();
    }

    /// Set the output gain in dB, clamped to the sink's range
    pub fn set_gain(&self, db: f32) {
        let clamped = self.shared.gain_range.clamp(db);
        let mut state = self.shared.lock();
        state.gain_db = clamped;
        state.gain_changed = true;
        drop(state);
        self.shared.wake.notify_one();
    }

    /// Current output gain in dB
    #[must_use]
    pub fn gain(&self) -> f32 {
        self.shared.lock().gain_db
    }

    /// Number of frames waiting to be played
    #[must_use]
    pub fn buffered_frames(&self) -> u64 {
        self.shared.lock().buffered_frames
    }

    /// Stop the drain thread and close the sink
    ///
    /// A write in progress is interrupted, then this blocks until the drain
    /// thread has exited. Call it off the async runtime.
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.wake.notify_all();
        if let Some(interrupt) = &self.interrupt {
            interrupt();
        }

        let handle = self
            .drain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Output drain thread panicked");
            }
        }
    }
}

impl OutputClock for AudioOutputQueue {
    fn now_secs(&self) -> f64 {
        self.shared.now_secs()
    }
}

impl Drop for AudioOutputQueue {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for AudioOutputQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioOutputQueue")
            .field("info", &self.shared.info)
            .field("buffered_frames", &self.buffered_frames())
            .finish_non_exhaustive()
    }
}

fn drain_loop(shared: &Shared, mut sink: Box<dyn AudioSink>) {
    let latency = sink.latency().as_secs_f64();
    let channels = shared.channels().max(1);
    let mut state = shared.lock();

    loop {
        if state.closed {
            break;
        }

        if state.gain_changed {
            state.gain_changed = false;
            sink.set_gain(state.gain_db);
        }

        let Some((&key, _)) = state.frames.first_key_value() else {
            state = wait(shared, state, shared.config.poll_interval);
            continue;
        };

        let Some(anchor) = state.anchor else {
            state = wait(shared, state, shared.config.poll_interval);
            continue;
        };

        let wait_secs = shared.due_secs(anchor, key) - latency - shared.now_secs();
        if wait_secs > 0.0 {
            let timeout = Duration::from_secs_f64(wait_secs).min(shared.config.poll_interval);
            state = wait(shared, state, timeout);
            continue;
        }

        let Some(mut samples) = state.frames.remove(&key) else {
            continue;
        };
        let frames = (samples.len() / channels) as u64;
        state.buffered_frames = state.buffered_frames.saturating_sub(frames);

        let end = key + frames;
        if let Some(played) = state.played_until {
            if end <= played {
                trace!(key, "Skipping frame already covered by earlier audio");
                continue;
            }
            if key < played {
                let overlap = usize::try_from(played - key).unwrap_or(usize::MAX);
                samples.drain(..(overlap * channels).min(samples.len()));
            }
        }
        state.played_until = Some(end.max(state.played_until.unwrap_or(0)));

        apply_gain(&mut samples, state.gain_db, shared.gain_range);
        drop(state);

        if let Err(e) = sink.write(&samples) {
            warn!(error = %e, "Audio sink write failed");
        }

        state = shared.lock();
    }

    drop(state);
    sink.close();
    debug!("Output drain thread stopped");
}

fn wait<'a>(
    shared: &'a Shared,
    state: MutexGuard<'a, QueueState>,
    timeout: Duration,
) -> MutexGuard<'a, QueueState> {
    match shared.wake.wait_timeout(state, timeout) {
        Ok((guard, _)) => guard,
        Err(poisoned) => poisoned.into_inner().0,
    }
}

/// Scale samples by a dB gain; the bottom of the range is silence
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn apply_gain(samples: &mut [i16], db: f32, range: GainRange) {
    if db >= 0.0 {
        return;
    }
    if db <= range.min_db {
        samples.fill(0);
        return;
    }

    let factor = 10f32.powf(db / 20.0);
    for sample in samples.iter_mut() {
        *sample = (f32::from(*sample) * factor)
            .round()
            .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
    }
}
