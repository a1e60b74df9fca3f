//! Shared setup for integration tests

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use raop_receiver::audio::{AudioSink, CaptureSink, pcm_codec_factory};
use raop_receiver::testing::fixtures;
use raop_receiver::{RaopReceiver, ReceiverConfig, ReceiverEvent};
use tokio::sync::broadcast;

/// A started receiver on 127.0.0.1 that plays into a capture sink
pub struct TestReceiver {
    pub receiver: RaopReceiver,
    pub addr: SocketAddr,
    pub capture: CaptureSink,
    pub events: broadcast::Receiver<ReceiverEvent>,
}

pub fn config(capture: &CaptureSink) -> ReceiverConfig {
    let sink = capture.clone();
    ReceiverConfig::with_name("Integration Test")
        .port(0)
        .bind_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .hardware_address(fixtures::HARDWARE_ADDRESS)
        .private_key_pem(fixtures::TEST_KEY_PEM)
        .advertise(false)
        .latency(Duration::ZERO)
        .timing_interval(Duration::from_millis(200))
        .codec_factory(pcm_codec_factory())
        .sink_factory(Arc::new(move || {
            Ok(Box::new(sink.clone()) as Box<dyn AudioSink>)
        }))
}

pub async fn start_receiver() -> TestReceiver {
    let capture = CaptureSink::new();
    let mut receiver = RaopReceiver::new(config(&capture));
    let events = receiver.subscribe();
    let addr = receiver.start().await.unwrap();

    TestReceiver {
        receiver,
        addr,
        capture,
        events,
    }
}

/// Wait for the first event matching `predicate`, skipping others
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<ReceiverEvent>,
    predicate: F,
) -> ReceiverEvent
where
    F: Fn(&ReceiverEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if predicate(&event) {
            return event;
        }
    }
}

/// Wait until the sink has seen at least `count` samples
pub async fn wait_for_samples(capture: &CaptureSink, count: usize) -> Vec<i16> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let samples = capture.samples();
        if samples.len() >= count || tokio::time::Instant::now() > deadline {
            return samples;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Big-endian samples as an `L16` payload
pub fn pcm(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}
