//! Audio sink abstraction
//!
//! The output queue drains decoded PCM into an [`AudioSink`]. Implementations
//! block in [`AudioSink::write`] until the device accepted the samples, which
//! paces the drain thread.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::format::AudioFormat;

/// Errors from audio sinks
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Format not supported
    #[error("Format not supported: {0:?}")]
    FormatNotSupported(AudioFormat),

    /// Stream error
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Write before open or after close
    #[error("Sink closed")]
    Closed,
}

/// Gain range in dB
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRange {
    /// Lowest gain (treated as mute)
    pub min_db: f32,
    /// Highest gain
    pub max_db: f32,
}

impl GainRange {
    /// Clamp a gain into this range; NaN maps to the minimum
    #[must_use]
    pub fn clamp(&self, db: f32) -> f32 {
        if db.is_nan() {
            return self.min_db;
        }
        db.clamp(self.min_db, self.max_db)
    }
}

impl Default for GainRange {
    fn default() -> Self {
        Self {
            min_db: -144.0,
            max_db: 0.0,
        }
    }
}

/// Makes a blocked [`AudioSink::write`] return from another thread
pub type SinkInterrupt = Arc<dyn Fn() + Send + Sync>;

/// PCM consumer for the output queue
pub trait AudioSink: Send {
    /// Configure the sink; called once before the first write
    ///
    /// # Errors
    /// Returns `SinkError` if the format cannot be played.
    fn open(&mut self, format: AudioFormat) -> Result<(), SinkError>;

    /// Play interleaved samples
    ///
    /// # Errors
    /// Returns `SinkError` if the device went away.
    fn write(&mut self, samples: &[i16]) -> Result<(), SinkError>;

    /// Notification of a gain change, already applied to the samples
    fn set_gain(&mut self, _db: f32) {}

    /// Gain range supported by this sink
    fn gain_range(&self) -> GainRange {
        GainRange::default()
    }

    /// Device latency to subtract from scheduling
    fn latency(&self) -> Duration {
        Duration::ZERO
    }

    /// Handle the queue calls when closing, before waiting on the drain thread
    ///
    /// Sinks whose `write` can block must return one; it is taken right
    /// after `open`. Writes after an interrupt fail with [`SinkError::Closed`].
    fn interrupt(&self) -> Option<SinkInterrupt> {
        None
    }

    /// Release the device
    fn close(&mut self);
}

/// Sink that discards everything
#[derive(Debug, Default)]
pub struct NullSink {
    open: bool,
}

impl NullSink {
    /// Create a new null sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for NullSink {
    fn open(&mut self, _format: AudioFormat) -> Result<(), SinkError> {
        self.open = true;
        Ok(())
    }

    fn write(&mut self, _samples: &[i16]) -> Result<(), SinkError> {
        if self.open {
            Ok(())
        } else {
            Err(SinkError::Closed)
        }
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// Everything a [`CaptureSink`] has seen
#[derive(Debug, Default, Clone)]
pub struct CaptureLog {
    /// Format passed to `open`
    pub format: Option<AudioFormat>,
    /// Each `write` call in order
    pub writes: Vec<Vec<i16>>,
    /// Each gain notification in order
    pub gains: Vec<f32>,
    /// Whether `close` was called
    pub closed: bool,
}

/// Sink that records writes in memory, shareable with the caller
#[derive(Debug, Clone, Default)]
pub struct CaptureSink {
    log: Arc<Mutex<CaptureLog>>,
}

impl CaptureSink {
    /// Create an empty capture sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    #[must_use]
    pub fn log(&self) -> CaptureLog {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All written samples concatenated
    #[must_use]
    pub fn samples(&self) -> Vec<i16> {
        self.log().writes.concat()
    }
}

impl AudioSink for CaptureSink {
    fn open(&mut self, format: AudioFormat) -> Result<(), SinkError> {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.format = Some(format);
        log.closed = false;
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<(), SinkError> {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        if log.closed {
            return Err(SinkError::Closed);
        }
        log.writes.push(samples.to_vec());
        Ok(())
    }

    fn set_gain(&mut self, db: f32) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gains
            .push(db);
    }

    fn close(&mut self) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed = true;
    }
}

/// Factory producing a fresh sink for each negotiated stream
pub type SinkFactory = Arc<dyn Fn() -> Result<Box<dyn AudioSink>, SinkError> + Send + Sync>;

/// Sink factory for the default output device
///
/// Uses CPAL when the `audio-cpal` feature is enabled, otherwise a
/// [`NullSink`].
#[must_use]
pub fn default_sink_factory() -> SinkFactory {
    #[cfg(feature = "audio-cpal")]
    {
        Arc::new(|| Ok(Box::new(super::output_cpal::CpalSink::new()?) as Box<dyn AudioSink>))
    }
    #[cfg(not(feature = "audio-cpal"))]
    {
        Arc::new(|| Ok(Box::new(NullSink::new()) as Box<dyn AudioSink>))
    }
}
