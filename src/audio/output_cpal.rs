//! CPAL-based audio sink
//!
//! Cross-platform playback using the `cpal` crate. CPAL pulls samples from a
//! callback while the output queue pushes them, so the two meet in a small
//! shared ring; `write` blocks while the ring is full, which paces the
//! queue's drain thread to the device clock.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError, mpsc};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::format::{AudioFormat, SampleFormat};
use super::sink::{AudioSink, SinkError, SinkInterrupt};

/// Audio held between the queue and the device callback
const RING_DURATION: Duration = Duration::from_millis(250);

enum StreamCommand {
    Stop,
}

#[derive(Default)]
struct RingState {
    samples: VecDeque<i16>,
    closed: bool,
}

#[derive(Default)]
struct Ring {
    state: Mutex<RingState>,
    space: Condvar,
    capacity: usize,
}

impl Ring {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RingState {
                samples: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            space: Condvar::new(),
            capacity,
        }
    }

    /// Wake a blocked writer and refuse further samples
    fn close(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed = true;
        self.space.notify_all();
    }

    /// Fill `out` from the ring, padding with silence on underrun
    fn pull<T>(&self, out: &mut [T], convert: impl Fn(i16) -> T, silence: T)
    where
        T: Copy,
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in out.iter_mut() {
            *slot = state.samples.pop_front().map_or(silence, &convert);
        }
        drop(state);
        self.space.notify_one();
    }
}

/// Sink playing through the default CPAL output device
pub struct CpalSink {
    device_name: Option<String>,
    ring: Arc<Ring>,
    command_tx: Option<mpsc::Sender<StreamCommand>>,
    latency: Duration,
}

impl CpalSink {
    /// Create a sink for the default device
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the host has no output device.
    pub fn new() -> Result<Self, SinkError> {
        let host = cpal::default_host();
        if host.default_output_device().is_none() {
            return Err(SinkError::DeviceNotFound("No default device".into()));
        }

        Ok(Self {
            device_name: None,
            ring: Arc::new(Ring::default()),
            command_tx: None,
            latency: RING_DURATION,
        })
    }

    /// Create a sink for a named device
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if no output device has that name.
    pub fn with_device(name: impl Into<String>) -> Result<Self, SinkError> {
        let name = name.into();
        find_device(Some(&name))?;
        Ok(Self {
            device_name: Some(name),
            ..Self::new()?
        })
    }

    fn spawn_stream_thread(
        device_name: Option<String>,
        format: AudioFormat,
        ring: Arc<Ring>,
        rx: mpsc::Receiver<StreamCommand>,
        status_tx: mpsc::Sender<Result<(), SinkError>>,
    ) {
        thread::spawn(move || {
            let stream = find_device(device_name.as_deref())
                .and_then(|device| build_stream(&device, format, ring));

            match stream {
                Ok(stream) => {
                    if let Err(e) = stream.play() {
                        let _ = status_tx.send(Err(SinkError::StreamError(e.to_string())));
                        return;
                    }

                    if status_tx.send(Ok(())).is_err() {
                        return;
                    }

                    // The stream lives until told to stop or the sink is dropped
                    let _ = rx.recv();
                    let _ = stream.pause();
                }
                Err(e) => {
                    let _ = status_tx.send(Err(e));
                }
            }
        });
    }
}

fn find_device(name: Option<&str>) -> Result<cpal::Device, SinkError> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| SinkError::StreamError(e.to_string()))?
            .find(|d| d.name().ok().as_deref() == Some(name))
            .ok_or_else(|| SinkError::DeviceNotFound(name.to_string())),
        None => host
            .default_output_device()
            .ok_or_else(|| SinkError::DeviceNotFound("No default device".into())),
    }
}

fn build_stream(
    device: &cpal::Device,
    format: AudioFormat,
    ring: Arc<Ring>,
) -> Result<cpal::Stream, SinkError> {
    let err_fn = |err| tracing::error!("CPAL stream error: {}", err);

    let device_format = match device
        .default_output_config()
        .map_err(|e| SinkError::StreamError(e.to_string()))?
        .sample_format()
    {
        cpal::SampleFormat::I16 => SampleFormat::I16,
        cpal::SampleFormat::F32 => SampleFormat::F32,
        _ => return Err(SinkError::FormatNotSupported(format)),
    };

    let config = cpal::StreamConfig {
        channels: u16::from(format.channels.channels()),
        sample_rate: cpal::SampleRate(format.sample_rate.as_u32()),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match device_format {
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                ring.pull(data, |s| s, 0);
            },
            err_fn,
            None,
        ),
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                ring.pull(data, |s| f32::from(s) / 32768.0, 0.0);
            },
            err_fn,
            None,
        ),
    };

    stream.map_err(|e| SinkError::StreamError(e.to_string()))
}

impl AudioSink for CpalSink {
    fn open(&mut self, format: AudioFormat) -> Result<(), SinkError> {
        self.close();

        let capacity = usize::try_from(format.duration_to_frames(RING_DURATION))
            .unwrap_or(usize::MAX)
            .saturating_mul(usize::from(format.channels.channels()));
        self.ring = Arc::new(Ring::with_capacity(capacity));

        let (tx, rx) = mpsc::channel();
        let (status_tx, status_rx) = mpsc::channel();

        Self::spawn_stream_thread(
            self.device_name.clone(),
            format,
            Arc::clone(&self.ring),
            rx,
            status_tx,
        );

        // Wait for initialization
        status_rx
            .recv()
            .map_err(|_| SinkError::StreamError("Audio thread panicked".into()))??;

        self.command_tx = Some(tx);
        tracing::info!(?format, "Opened CPAL output");
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<(), SinkError> {
        if self.command_tx.is_none() {
            return Err(SinkError::Closed);
        }

        let mut state = self
            .ring
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !state.closed && state.samples.len() + samples.len() > self.ring.capacity {
            state = match self.ring.space.wait_timeout(state, Duration::from_millis(50)) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        if state.closed {
            return Err(SinkError::Closed);
        }
        state.samples.extend(samples.iter().copied());
        Ok(())
    }

    fn latency(&self) -> Duration {
        self.latency
    }

    fn interrupt(&self) -> Option<SinkInterrupt> {
        let ring = Arc::clone(&self.ring);
        Some(Arc::new(move || ring.close()))
    }

    fn close(&mut self) {
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(StreamCommand::Stop);
        }
        self.ring.close();
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}
