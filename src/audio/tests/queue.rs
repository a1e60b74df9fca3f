use std::sync::{Arc, Condvar, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use proptest::prelude::*;

use crate::audio::format::{AudioFormat, FormatInfo};
use crate::audio::queue::{AudioOutputQueue, OutputClock, QueueConfig, apply_gain};
use crate::audio::sink::{AudioSink, CaptureSink, GainRange, SinkError, SinkInterrupt};

fn info() -> FormatInfo {
    FormatInfo {
        format: AudioFormat::AIRTUNES,
        frames_per_packet: 2,
    }
}

fn config(start_latency: Duration) -> QueueConfig {
    QueueConfig {
        start_latency,
        max_buffered: Duration::from_secs(10),
        poll_interval: Duration::from_millis(2),
    }
}

fn queue_with(start_latency: Duration) -> (AudioOutputQueue, CaptureSink) {
    let capture = CaptureSink::new();
    let queue =
        AudioOutputQueue::new(info(), Box::new(capture.clone()), config(start_latency)).unwrap();
    (queue, capture)
}

/// Two stereo frames tagged with `value`
#[allow(clippy::cast_possible_truncation)]
fn frame(value: u32) -> Vec<i16> {
    vec![value as i16; 4]
}

fn wait_for_writes(capture: &CaptureSink, count: usize) -> Vec<Vec<i16>> {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        let writes = capture.log().writes;
        if writes.len() >= count || Instant::now() > deadline {
            return writes;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

fn first_samples(writes: &[Vec<i16>]) -> Vec<i16> {
    writes.iter().map(|w| w[0]).collect()
}

#[test]
fn test_drains_in_timestamp_order() {
    let (queue, capture) = queue_with(Duration::from_millis(50));

    assert!(queue.enqueue(100, frame(100)));
    assert!(queue.enqueue(80, frame(80)));
    assert!(queue.enqueue(120, frame(120)));

    let writes = wait_for_writes(&capture, 3);
    assert_eq!(first_samples(&writes), vec![80, 100, 120]);
}

#[test]
fn test_flush_rejects_stale_audio() {
    let (queue, capture) = queue_with(Duration::from_millis(5));

    assert!(queue.enqueue(100, frame(100)));
    assert_eq!(wait_for_writes(&capture, 1).len(), 1);

    queue.flush();
    assert_eq!(queue.buffered_frames(), 0);
    assert!(!queue.enqueue(80, frame(80)));

    assert!(queue.enqueue(200, frame(200)));
    let writes = wait_for_writes(&capture, 2);
    assert_eq!(first_samples(&writes), vec![100, 200]);
}

#[test]
fn test_flush_discards_queued_frames() {
    let (queue, capture) = queue_with(Duration::from_secs(30));

    assert!(queue.enqueue(100, frame(100)));
    assert!(queue.enqueue(102, frame(102)));
    assert_eq!(queue.buffered_frames(), 4);

    queue.flush();
    assert_eq!(queue.buffered_frames(), 0);
    assert!(!queue.enqueue(102, frame(102)));

    thread::sleep(Duration::from_millis(20));
    assert!(capture.log().writes.is_empty());
}

#[test]
fn test_late_frame_is_dropped() {
    let (queue, capture) = queue_with(Duration::from_millis(5));

    assert!(queue.enqueue(100, frame(100)));
    wait_for_writes(&capture, 1);

    assert!(!queue.enqueue(90, frame(90)));
}

#[test]
fn test_timestamp_wraparound_keeps_order() {
    let (queue, capture) = queue_with(Duration::from_millis(50));

    assert!(queue.enqueue(0, frame(7)));
    assert!(queue.enqueue(u32::MAX - 1, frame(6)));

    let writes = wait_for_writes(&capture, 2);
    assert_eq!(first_samples(&writes), vec![6, 7]);
}

#[test]
fn test_gain_is_clamped_and_applied() {
    let (queue, capture) = queue_with(Duration::from_millis(5));

    queue.set_gain(6.0);
    assert!((queue.gain() - 0.0).abs() < f32::EPSILON);

    queue.set_gain(-200.0);
    assert!((queue.gain() - -144.0).abs() < f32::EPSILON);

    queue.set_gain(-15.0);
    assert!((queue.gain() - -15.0).abs() < f32::EPSILON);

    assert!(queue.enqueue(100, vec![10_000; 4]));
    let writes = wait_for_writes(&capture, 1);

    // -15 dB is a factor of about 0.178
    assert!((1700..1800).contains(&writes[0][0]));
    assert_eq!(capture.log().gains.last().copied(), Some(-15.0));
}

#[test]
fn test_anchor_moves_playback() {
    let (queue, capture) = queue_with(Duration::from_secs(30));

    assert!(queue.enqueue(1000, frame(1)));
    thread::sleep(Duration::from_millis(10));
    assert!(capture.log().writes.is_empty());

    queue.set_anchor(1000, queue.now_secs());
    assert_eq!(wait_for_writes(&capture, 1).len(), 1);
}

#[test]
fn test_next_free_secs_without_audio() {
    let (queue, _capture) = queue_with(Duration::from_millis(500));

    let expected = queue.now_secs() + 0.5;
    assert!((queue.next_free_secs() - expected).abs() < 0.1);
}

#[test]
fn test_next_free_secs_follows_queued_audio() {
    let (queue, _capture) = queue_with(Duration::from_secs(30));

    assert!(queue.enqueue(0, vec![0; 44100 * 2]));
    let expected = queue.now_secs() + 31.0;
    assert!((queue.next_free_secs() - expected).abs() < 0.1);
}

#[test]
fn test_close_stops_drain_and_sink() {
    let (queue, capture) = queue_with(Duration::from_millis(5));

    queue.close();
    assert!(capture.log().closed);
    assert!(!queue.enqueue(100, frame(100)));

    // Closing twice is harmless
    queue.close();
}

/// Sink whose writes block until it is interrupted, like a stalled device
#[derive(Clone, Default)]
struct StalledSink {
    released: Arc<(Mutex<bool>, Condvar)>,
}

impl StalledSink {
    fn release(&self) {
        let (released, cvar) = &*self.released;
        *released.lock().unwrap() = true;
        cvar.notify_all();
    }
}

impl AudioSink for StalledSink {
    fn open(&mut self, _format: AudioFormat) -> Result<(), SinkError> {
        Ok(())
    }

    fn write(&mut self, _samples: &[i16]) -> Result<(), SinkError> {
        let (released, cvar) = &*self.released;
        let guard = cvar
            .wait_while(released.lock().unwrap(), |released| !*released)
            .unwrap();
        drop(guard);
        Err(SinkError::Closed)
    }

    fn interrupt(&self) -> Option<SinkInterrupt> {
        let sink = self.clone();
        Some(Arc::new(move || sink.release()))
    }

    fn close(&mut self) {
        self.release();
    }
}

#[test]
fn test_close_interrupts_blocked_write() {
    let queue = AudioOutputQueue::new(
        info(),
        Box::new(StalledSink::default()),
        config(Duration::ZERO),
    )
    .unwrap();
    assert!(queue.enqueue(0, frame(1)));

    // Let the drain thread enter the stalled write
    let deadline = Instant::now() + Duration::from_secs(2);
    while queue.buffered_frames() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(queue.buffered_frames(), 0);

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        queue.close();
        let _ = tx.send(());
    });
    assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
}

#[test]
fn test_clock_advances() {
    let (queue, _capture) = queue_with(Duration::from_millis(5));

    let before = queue.now_secs();
    thread::sleep(Duration::from_millis(5));
    assert!(queue.now_secs() > before);
}

#[test]
fn test_apply_gain() {
    let range = GainRange::default();

    let mut samples = vec![1000, -1000];
    apply_gain(&mut samples, 0.0, range);
    assert_eq!(samples, vec![1000, -1000]);

    apply_gain(&mut samples, -6.020_6, range);
    assert_eq!(samples, vec![500, -500]);

    apply_gain(&mut samples, -144.0, range);
    assert_eq!(samples, vec![0, 0]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_any_arrival_order_drains_sorted(
        slots in prop::collection::hash_set(0u32..1000, 1..12)
            .prop_map(|s| s.into_iter().collect::<Vec<_>>())
            .prop_shuffle()
    ) {
        let (queue, capture) = queue_with(Duration::from_millis(30));
        for slot in &slots {
            prop_assert!(queue.enqueue(slot * 4, frame(*slot)));
        }

        let writes = wait_for_writes(&capture, slots.len());
        let mut expected = slots.clone();
        expected.sort_unstable();
        #[allow(clippy::cast_possible_truncation)]
        let expected: Vec<i16> = expected.into_iter().map(|s| s as i16).collect();
        prop_assert_eq!(first_samples(&writes), expected);
    }
}
