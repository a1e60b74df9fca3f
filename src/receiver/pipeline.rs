//! RTP processing pipeline
//!
//! Every datagram from the audio, control and timing sockets enters the same
//! chain of stages. A stage consumes the item kinds it handles and passes
//! everything else on unchanged:
//!
//! ```text
//! unwrap_retransmit -> synchronize -> decrypt -> decode -> track_gaps -> enqueue
//! ```
//!
//! Packets a stage wants sent back to the sender are collected in
//! [`StageOutput`]; the channel layer routes them to the matching socket.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::retransmit::{RetransmitConfig, RetransmitTracker};
use super::timing::TimingSynchronizer;
use crate::audio::{AudioDecoder, AudioOutputQueue, FormatInfo, OutputClock};
use crate::protocol::crypto::{CryptoMaterial, PayloadCipher};
use crate::protocol::rtp::RtpPacket;

/// What travels between stages
#[derive(Debug)]
pub enum PipelineItem {
    /// A packet not yet turned into audio
    Packet(RtpPacket),
    /// PCM ready for the output queue
    Decoded {
        /// RTP sequence number
        sequence: u16,
        /// RTP timestamp of the first frame
        timestamp: u32,
        /// Interleaved samples
        samples: Vec<i16>,
    },
}

/// Side effects of running packets through the pipeline
#[derive(Debug, Default)]
pub struct StageOutput {
    /// Packets to send to the sender
    pub outbound: Vec<RtpPacket>,
    /// Sequences the retransmit tracker gave up on
    pub abandoned: Vec<u16>,
}

impl StageOutput {
    fn absorb(&mut self, update: super::retransmit::TrackerUpdate) {
        self.outbound
            .extend(update.requests.into_iter().map(RtpPacket::RetransmitRequest));
        self.abandoned.extend(update.abandoned);
    }
}

type Stage = fn(&AudioPipeline, PipelineItem, &mut StageOutput) -> Option<PipelineItem>;

const STAGES: [(&str, Stage); 6] = [
    ("unwrap_retransmit", unwrap_retransmit),
    ("synchronize", synchronize),
    ("decrypt", decrypt),
    ("decode", decode),
    ("track_gaps", track_gaps),
    ("enqueue", enqueue),
];

/// The per-stream audio pipeline built by ANNOUNCE
pub struct AudioPipeline {
    cipher: Option<PayloadCipher>,
    decoder: Mutex<Box<dyn AudioDecoder>>,
    tracker: Mutex<RetransmitTracker>,
    timing: Mutex<TimingSynchronizer>,
    queue: Arc<AudioOutputQueue>,
}

impl AudioPipeline {
    /// Assemble a pipeline around a configured decoder and an open queue
    ///
    /// The tracker and synchronizer read time from the queue.
    #[must_use]
    pub fn new(
        decoder: Box<dyn AudioDecoder>,
        crypto: Option<&CryptoMaterial>,
        queue: Arc<AudioOutputQueue>,
        retransmit: RetransmitConfig,
    ) -> Self {
        let clock: Arc<dyn OutputClock> = queue.clone();
        Self {
            cipher: crypto.map(PayloadCipher::new),
            decoder: Mutex::new(decoder),
            tracker: Mutex::new(RetransmitTracker::new(retransmit, Arc::clone(&clock))),
            timing: Mutex::new(TimingSynchronizer::new(clock)),
            queue,
        }
    }

    /// Whether audio payloads are decrypted
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Format of the decoded stream
    #[must_use]
    pub fn format_info(&self) -> FormatInfo {
        self.queue.format_info()
    }

    /// The output queue
    #[must_use]
    pub fn queue(&self) -> &AudioOutputQueue {
        &self.queue
    }

    /// Current clock offset to the sender
    #[must_use]
    pub fn clock_offset(&self) -> Option<f64> {
        lock(&self.timing).offset()
    }

    /// Run one packet through every stage
    pub fn process(&self, packet: RtpPacket) -> StageOutput {
        let mut output = StageOutput::default();
        let mut item = PipelineItem::Packet(packet);

        for (name, stage) in STAGES {
            match stage(self, item, &mut output) {
                Some(next) => item = next,
                None => {
                    trace!(stage = name, "Item consumed");
                    return output;
                }
            }
        }

        output
    }

    /// Periodic retransmit bookkeeping
    pub fn poll_retransmits(&self) -> StageOutput {
        let mut output = StageOutput::default();
        output.absorb(lock(&self.tracker).poll());
        output
    }

    /// Build the next timing request
    pub fn timing_request(&self) -> RtpPacket {
        RtpPacket::TimingRequest(lock(&self.timing).request())
    }

    /// Drop queued audio and forget pending retransmits
    pub fn flush(&self) {
        self.queue.flush();
        lock(&self.tracker).reset();
    }

    /// Stop playback and release the sink
    pub fn close(&self) {
        self.queue.close();
    }
}

impl std::fmt::Debug for AudioPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPipeline")
            .field("encrypted", &self.is_encrypted())
            .field("format", &self.format_info())
            .finish_non_exhaustive()
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Retransmitted audio is processed like any other audio packet
fn unwrap_retransmit(
    _: &AudioPipeline,
    item: PipelineItem,
    _: &mut StageOutput,
) -> Option<PipelineItem> {
    match item {
        PipelineItem::Packet(RtpPacket::RetransmitResponse(response)) => {
            trace!(seq = response.audio.sequence(), "Unwrapped retransmitted packet");
            Some(PipelineItem::Packet(RtpPacket::Audio(response.audio)))
        }
        other => Some(other),
    }
}

/// Timing exchange and sync packets
fn synchronize(
    pipeline: &AudioPipeline,
    item: PipelineItem,
    output: &mut StageOutput,
) -> Option<PipelineItem> {
    match item {
        PipelineItem::Packet(RtpPacket::TimingResponse(response)) => {
            lock(&pipeline.timing).on_response(&response);
            None
        }
        PipelineItem::Packet(RtpPacket::TimingRequest(request)) => {
            let response = lock(&pipeline.timing).on_request(&request);
            output.outbound.push(RtpPacket::TimingResponse(response));
            None
        }
        PipelineItem::Packet(RtpPacket::Sync(sync)) => {
            lock(&pipeline.timing).on_sync(&sync, &pipeline.queue);
            None
        }
        other => Some(other),
    }
}

fn decrypt(
    pipeline: &AudioPipeline,
    item: PipelineItem,
    _: &mut StageOutput,
) -> Option<PipelineItem> {
    match (item, &pipeline.cipher) {
        (PipelineItem::Packet(RtpPacket::Audio(mut audio)), Some(cipher)) => {
            audio.payload = Bytes::from(cipher.decrypt(&audio.payload));
            Some(PipelineItem::Packet(RtpPacket::Audio(audio)))
        }
        (other, _) => Some(other),
    }
}

/// Undecodable frames are passed on as raw packets
fn decode(
    pipeline: &AudioPipeline,
    item: PipelineItem,
    _: &mut StageOutput,
) -> Option<PipelineItem> {
    let audio = match item {
        PipelineItem::Packet(RtpPacket::Audio(audio)) => audio,
        other => return Some(other),
    };

    match lock(&pipeline.decoder).decode(&audio.payload) {
        Ok(samples) => Some(PipelineItem::Decoded {
            sequence: audio.sequence(),
            timestamp: audio.timestamp,
            samples,
        }),
        Err(e) => {
            warn!(seq = audio.sequence(), error = %e, "Failed to decode audio packet");
            Some(PipelineItem::Packet(RtpPacket::Unknown(
                RtpPacket::Audio(audio).encode(),
            )))
        }
    }
}

fn track_gaps(
    pipeline: &AudioPipeline,
    item: PipelineItem,
    output: &mut StageOutput,
) -> Option<PipelineItem> {
    if let PipelineItem::Decoded { sequence, .. } = &item {
        output.absorb(lock(&pipeline.tracker).on_packet(*sequence));
    }
    Some(item)
}

/// Terminal stage
fn enqueue(
    pipeline: &AudioPipeline,
    item: PipelineItem,
    _: &mut StageOutput,
) -> Option<PipelineItem> {
    match item {
        PipelineItem::Decoded {
            sequence,
            timestamp,
            samples,
        } => {
            if !pipeline.queue.enqueue(timestamp, samples) {
                debug!(seq = sequence, timestamp, "Output queue rejected frame");
            }
        }
        PipelineItem::Packet(packet) => {
            debug!(kind = packet.kind(), "No stage handles packet, discarding");
        }
    }
    None
}
