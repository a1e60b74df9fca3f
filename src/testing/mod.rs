//! Test support: protocol vectors, a manual clock and a scripted sender
//!
//! Public so integration tests and downstream crates can drive a receiver
//! without real hardware.

pub mod fixtures;
pub mod mock_sender;

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

pub use crate::audio::CaptureSink;
pub use mock_sender::{MockSender, MockSenderError};

use crate::audio::OutputClock;

/// Output clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    secs: Mutex<f64>,
}

impl ManualClock {
    /// Create a clock at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        *self.secs.lock().unwrap_or_else(PoisonError::into_inner) += by.as_secs_f64();
    }

    /// Jump to an absolute time
    pub fn set(&self, secs: f64) {
        *self.secs.lock().unwrap_or_else(PoisonError::into_inner) = secs;
    }
}

impl OutputClock for ManualClock {
    fn now_secs(&self) -> f64 {
        *self.secs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
