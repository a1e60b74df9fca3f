//! RTSP session state machine
//!
//! One [`RtspSession`] per TCP connection. Every method handler changes
//! state under the session lock, so a TEARDOWN reset can never interleave
//! with an ANNOUNCE building a new pipeline. Whatever a reset detaches is
//! released after the lock is dropped. RTP receive loops take the same lock
//! only long enough to copy out the handles they need.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::challenge::apple_response;
use super::channels::{Channel, Routes, RtpChannels};
use super::config::ReceiverConfig;
use super::events::ReceiverEvent;
use super::pipeline::AudioPipeline;
use super::track::{Artwork, CurrentTrack, TrackInfo};
use crate::audio::{AudioOutputQueue, FormatInfo};
use crate::error::SessionError;
use crate::protocol::crypto::ReceiverKey;
use crate::protocol::daap::{DMAP_CONTENT_TYPE, DmapParser};
use crate::protocol::rtsp::headers::{names, raop};
use crate::protocol::rtsp::{
    Method, ResponseBuilder, RtspRequest, RtspResponse, StatusCode, TransportOption, TransportSpec,
};
use crate::protocol::sdp::{AnnounceDescription, SDP_CONTENT_TYPE};

/// Session token returned by SETUP
pub const SESSION_ID: &str = "DEADBEEEF";

/// Methods advertised by OPTIONS
pub const PUBLIC_METHODS: &str =
    "ANNOUNCE, SETUP, RECORD, PAUSE, FLUSH, TEARDOWN, OPTIONS, GET_PARAMETER, SET_PARAMETER";

/// Content type of line-oriented parameters
pub const PARAMETERS_CONTENT_TYPE: &str = "text/parameters";

/// Content type of cover art
pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Coarse session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nothing negotiated
    Idle,
    /// ANNOUNCE built the audio pipeline
    Announced,
    /// SETUP opened the RTP channels
    SetUp,
    /// RECORD received, audio flowing
    Recording,
    /// TEARDOWN received
    Torndown,
}

/// Stream negotiated by ANNOUNCE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    /// RTP payload format index
    pub format_index: u32,
    /// Decoded format
    pub format: FormatInfo,
    /// Whether audio payloads are AES encrypted
    pub encrypted: bool,
}

/// Everything a session owns
#[derive(Debug)]
pub(crate) struct SessionState {
    phase: SessionPhase,
    stream: Option<StreamInfo>,
    pipeline: Option<Arc<AudioPipeline>>,
    channels: RtpChannels,
}

/// The session lock
pub(crate) type SharedState = Arc<Mutex<SessionState>>;

impl SessionState {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            stream: None,
            pipeline: None,
            channels: RtpChannels::default(),
        }
    }

    /// Snapshot of the handles packet processing needs
    pub(crate) fn routes(&self) -> Option<Routes> {
        let pipeline = self.pipeline.clone()?;
        let (control, timing) = self.channels.outbound();
        Some(Routes {
            pipeline,
            control,
            timing,
        })
    }

    /// Detach the pipeline and channels; `None` if nothing was open
    fn reset(&mut self) -> Option<Detached> {
        let was_configured = self.pipeline.is_some() || self.channels.is_open();
        let tasks = self.channels.close();
        self.stream = None;
        let pipeline = self.pipeline.take();
        was_configured.then_some(Detached { pipeline, tasks })
    }
}

/// Resources taken out of a session, released after the lock is dropped
#[must_use = "release the resources once the session lock is dropped"]
struct Detached {
    pipeline: Option<Arc<AudioPipeline>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Detached {
    fn tasks(tasks: Vec<JoinHandle<()>>) -> Self {
        Self {
            pipeline: None,
            tasks,
        }
    }

    /// Wait for the RTP tasks to let go of their sockets, then close the
    /// output queue on the blocking pool
    async fn release(self) {
        for task in self.tasks {
            // Aborted tasks resolve to a cancellation error
            let _ = task.await;
        }
        if let Some(pipeline) = self.pipeline {
            if let Err(e) = tokio::task::spawn_blocking(move || pipeline.close()).await {
                warn!(error = %e, "Closing audio pipeline failed");
            }
        }
    }
}

/// Collaborators shared by every session of a receiver
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Receiver configuration
    pub config: Arc<ReceiverConfig>,
    /// Device private key
    pub key: Arc<ReceiverKey>,
    /// Event channel
    pub events: broadcast::Sender<ReceiverEvent>,
    /// Now-playing state
    pub track: CurrentTrack,
}

/// Response plus whether the connection closes after it
#[derive(Debug)]
pub struct Reply {
    /// Response to send
    pub response: RtspResponse,
    /// Close the connection once the response is written
    pub close: bool,
}

/// State machine for one RTSP connection
#[derive(Debug)]
pub struct RtspSession {
    context: SessionContext,
    state: SharedState,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl RtspSession {
    /// Create a session for a connection between `local_addr` and `peer_addr`
    #[must_use]
    pub fn new(context: SessionContext, local_addr: SocketAddr, peer_addr: SocketAddr) -> Self {
        Self {
            context,
            state: Arc::new(Mutex::new(SessionState::new())),
            local_addr,
            peer_addr,
        }
    }

    /// Current lifecycle phase
    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    /// Stream negotiated by the last ANNOUNCE
    pub async fn stream(&self) -> Option<StreamInfo> {
        self.state.lock().await.stream
    }

    /// Output gain, if a queue exists
    pub async fn gain(&self) -> Option<f32> {
        let state = self.state.lock().await;
        state.pipeline.as_ref().map(|p| p.queue().gain())
    }

    /// Handle one request
    ///
    /// # Errors
    /// Returns `SessionError` for malformed or out-of-order requests and for
    /// failures setting up the pipeline. The caller answers these with
    /// [`Self::error_response`] and closes the connection.
    pub async fn handle(&self, request: &RtspRequest) -> Result<Reply, SessionError> {
        let cseq = request
            .headers
            .cseq()
            .ok_or_else(|| SessionError::protocol("Missing CSeq header"))?;

        let signed_challenge = match request.headers.get(raop::APPLE_CHALLENGE) {
            Some(challenge) => Some(apple_response(
                challenge,
                self.local_addr.ip(),
                &self.context.config.hardware_address,
                &self.context.key,
            )?),
            None => None,
        };

        debug!(method = %request.method, cseq, "Handling RTSP request");
        let (builder, close) = match &request.method {
            Method::Options => (ResponseBuilder::ok().header(names::PUBLIC, PUBLIC_METHODS), false),
            Method::Announce => (self.announce(request).await?, false),
            Method::Setup => (self.setup(request).await?, false),
            Method::Record => (self.record().await?, false),
            Method::Flush => (self.flush().await, false),
            Method::Teardown => (self.teardown().await, true),
            Method::SetParameter => (self.set_parameter(request).await?, false),
            Method::GetParameter => (self.get_parameter().await, false),
            Method::Pause | Method::Other(_) => {
                warn!(method = %request.method, "Unsupported RTSP method");
                (ResponseBuilder::error(StatusCode::METHOD_NOT_VALID), false)
            }
        };

        let mut builder = builder.cseq(cseq).audio_jack_connected();
        if let Some(signed) = signed_challenge {
            builder = builder.header(raop::APPLE_RESPONSE, &signed);
        }

        Ok(Reply {
            response: builder.build(),
            close,
        })
    }

    /// `500` answer for a request whose handler failed
    #[must_use]
    pub fn error_response(request: &RtspRequest) -> RtspResponse {
        let builder = ResponseBuilder::error(StatusCode::INTERNAL_ERROR).audio_jack_connected();
        match request.headers.cseq() {
            Some(cseq) => builder.cseq(cseq).build(),
            None => builder.build(),
        }
    }

    /// Tear down the audio pipeline and RTP channels
    ///
    /// Safe to call in any state, any number of times.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        let detached = self.reset_locked(&mut state);
        drop(state);

        if let Some(detached) = detached {
            detached.release().await;
        }
    }

    fn reset_locked(&self, state: &mut SessionState) -> Option<Detached> {
        let detached = state.reset();
        if detached.is_some() {
            info!(peer = %self.peer_addr, "Session reset");
            let _ = self.context.events.send(ReceiverEvent::SessionReset {
                address: self.peer_addr,
            });
        }
        if state.phase != SessionPhase::Torndown {
            state.phase = SessionPhase::Idle;
        }
        detached
    }

    async fn announce(&self, request: &RtspRequest) -> Result<ResponseBuilder, SessionError> {
        let content_type = request.headers.content_type();
        if content_type != Some(SDP_CONTENT_TYPE) {
            return Err(SessionError::protocol(format!(
                "Unsupported ANNOUNCE content type {}",
                content_type.unwrap_or("(none)")
            )));
        }
        let body = std::str::from_utf8(&request.body)
            .map_err(|_| SessionError::protocol("ANNOUNCE body is not UTF-8"))?;

        // The previous sink is released before the new one opens
        let mut state = self.state.lock().await;
        let previous = self.reset_locked(&mut state);
        drop(state);
        if let Some(previous) = previous {
            previous.release().await;
        }

        let mut state = self.state.lock().await;
        let (pipeline, info) = self.build_pipeline(body)?;
        state.pipeline = Some(pipeline);
        state.stream = Some(info);
        state.phase = SessionPhase::Announced;
        drop(state);

        info!(
            peer = %self.peer_addr,
            format_index = info.format_index,
            encrypted = info.encrypted,
            rate = info.format.format.sample_rate.as_u32(),
            "Stream announced"
        );
        let _ = self.context.events.send(ReceiverEvent::StreamAnnounced {
            address: self.peer_addr,
            format_index: info.format_index,
            encrypted: info.encrypted,
        });

        Ok(ResponseBuilder::ok())
    }

    /// Decoder, output queue and pipeline for an SDP description
    fn build_pipeline(
        &self,
        body: &str,
    ) -> Result<(Arc<AudioPipeline>, StreamInfo), SessionError> {
        let config = &self.context.config;

        let mut decoder = (config.codec_factory)();
        let stream = AnnounceDescription::parse(body, decoder.encoding_name())?
            .negotiate(&self.context.key)?;
        let format = decoder.configure(&stream.format_options)?;

        let sink = (config.sink_factory)()?;
        let queue = Arc::new(AudioOutputQueue::new(format, sink, config.queue.clone())?);
        let pipeline = AudioPipeline::new(
            decoder,
            stream.crypto.as_ref(),
            queue,
            config.retransmit.clone(),
        );

        let info = StreamInfo {
            format_index: stream.format_index,
            format,
            encrypted: pipeline.is_encrypted(),
        };
        Ok((Arc::new(pipeline), info))
    }

    async fn setup(&self, request: &RtspRequest) -> Result<ResponseBuilder, SessionError> {
        if self.state.lock().await.pipeline.is_none() {
            return Err(SessionError::protocol(
                "Audio pipeline not configured, SETUP before ANNOUNCE",
            ));
        }

        let header = request
            .headers
            .get(names::TRANSPORT)
            .ok_or_else(|| SessionError::protocol("SETUP without Transport header"))?;
        let requested = TransportSpec::parse(header)?;

        let local_ip = self.local_addr.ip();
        let peer_ip = self.peer_addr.ip();

        // Dropping `channels` on error closes whatever was opened so far
        let mut channels = RtpChannels::default();
        let mut reply = TransportSpec::new();

        for option in &requested.options {
            match option.name.as_str() {
                "interleaved" => {
                    if option.value.as_deref() != Some("0-1") {
                        return Err(SessionError::protocol(format!(
                            "Unsupported Transport option {option}, interleaved must be 0-1"
                        )));
                    }
                    reply.push(option.clone());
                }
                "mode" => {
                    if option.value.as_deref() != Some("record") {
                        return Err(SessionError::protocol(format!(
                            "Unsupported Transport option {option}, mode must be record"
                        )));
                    }
                    reply.push(option.clone());
                }
                "control_port" | "timing_port" => {
                    let channel = if option.name == "control_port" {
                        Channel::Control
                    } else {
                        Channel::Timing
                    };
                    let remote = SocketAddr::new(peer_ip, option.port()?);
                    let port = channels.open_connected(channel, local_ip, remote).await?;
                    reply.push(TransportOption::with_value(
                        option.name.clone(),
                        port.to_string(),
                    ));
                }
                _ => reply.push(option.clone()),
            }
        }

        let audio_port = channels.open_unconnected(Channel::Audio, local_ip).await?;
        reply.push(TransportOption::with_value("server_port", audio_port.to_string()));

        let config = &self.context.config;
        let mut state = self.state.lock().await;
        // A reset may have run while the sockets were opening
        if state.pipeline.is_none() {
            return Err(SessionError::protocol(
                "Audio pipeline not configured, SETUP before ANNOUNCE",
            ));
        }
        let replaced = Detached::tasks(state.channels.close());
        state.channels = channels;
        state.channels.start(
            &self.state,
            &self.context.events,
            config.retransmit.retry_interval,
            config.timing_interval,
        );
        if state.phase != SessionPhase::Recording {
            state.phase = SessionPhase::SetUp;
        }
        drop(state);
        replaced.release().await;

        info!(peer = %self.peer_addr, transport = %reply, "RTP channels set up");
        Ok(ResponseBuilder::ok()
            .header(names::TRANSPORT, &reply.to_string())
            .session(SESSION_ID))
    }

    async fn record(&self) -> Result<ResponseBuilder, SessionError> {
        let mut state = self.state.lock().await;
        if state.pipeline.is_none() {
            return Err(SessionError::protocol(
                "Audio pipeline not configured, RECORD before ANNOUNCE",
            ));
        }
        state.phase = SessionPhase::Recording;
        drop(state);

        info!(peer = %self.peer_addr, "Client started streaming");
        let _ = self.context.events.send(ReceiverEvent::StreamStarted {
            address: self.peer_addr,
        });
        Ok(ResponseBuilder::ok())
    }

    async fn flush(&self) -> ResponseBuilder {
        let state = self.state.lock().await;
        if let Some(pipeline) = &state.pipeline {
            pipeline.flush();
            drop(state);

            info!(peer = %self.peer_addr, "Client paused streaming, flushed audio output queue");
            let _ = self.context.events.send(ReceiverEvent::StreamFlushed {
                address: self.peer_addr,
            });
        }
        ResponseBuilder::ok()
    }

    async fn teardown(&self) -> ResponseBuilder {
        let mut state = self.state.lock().await;
        let detached = self.reset_locked(&mut state);
        state.phase = SessionPhase::Torndown;
        drop(state);

        if let Some(detached) = detached {
            detached.release().await;
        }

        info!(peer = %self.peer_addr, "Client ended streaming");
        ResponseBuilder::ok()
    }

    async fn set_parameter(&self, request: &RtspRequest) -> Result<ResponseBuilder, SessionError> {
        match request.headers.content_type() {
            Some(DMAP_CONTENT_TYPE) => {
                let items = DmapParser::parse_flat(&request.body)?;
                let track = TrackInfo::from_dmap(&items);
                info!(
                    title = track.title.as_deref().unwrap_or(""),
                    artist = track.artist.as_deref().unwrap_or(""),
                    "Track info received"
                );
                self.context.track.replace(track);
            }
            Some(JPEG_CONTENT_TYPE) => {
                debug!(bytes = request.body.len(), "Cover art received");
                self.context.track.set_artwork(Artwork {
                    data: request.body.clone(),
                    mime_type: JPEG_CONTENT_TYPE.to_string(),
                });
            }
            Some(PARAMETERS_CONTENT_TYPE) => {
                let body = String::from_utf8_lossy(&request.body);
                let parameters = parse_parameters(&body)?;
                self.apply_parameters(&parameters).await?;
            }
            other => debug!(content_type = ?other, "Ignoring SET_PARAMETER content"),
        }
        Ok(ResponseBuilder::ok())
    }

    async fn apply_parameters(&self, parameters: &[(&str, &str)]) -> Result<(), SessionError> {
        let mut volume = None;
        for &(name, value) in parameters {
            if name == "volume" {
                let db: f32 = value.trim().parse().map_err(|_| {
                    SessionError::protocol(format!("Unable to parse volume {value}"))
                })?;
                volume = Some(db);
            } else {
                debug!(name, "Ignoring unknown parameter");
            }
        }

        let Some(db) = volume else {
            return Ok(());
        };
        let state = self.state.lock().await;
        if let Some(pipeline) = &state.pipeline {
            pipeline.queue().set_gain(db);
            let applied = pipeline.queue().gain();
            drop(state);

            info!(db = applied, "Volume set");
            let _ = self
                .context
                .events
                .send(ReceiverEvent::VolumeChanged { db: applied });
        }
        Ok(())
    }

    async fn get_parameter(&self) -> ResponseBuilder {
        match self.gain().await {
            Some(gain) => ResponseBuilder::ok().text_body(&format!("volume: {gain:?}\r\n")),
            None => ResponseBuilder::ok(),
        }
    }
}

/// Split a `text/parameters` body into `(name, value)` pairs
///
/// Lines must look like `name: value`; blank lines are skipped.
///
/// # Errors
/// Returns a protocol error naming the first malformed line.
pub fn parse_parameters(body: &str) -> Result<Vec<(&str, &str)>, SessionError> {
    body.split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(|line| {
            parse_parameter_line(line)
                .ok_or_else(|| SessionError::protocol(format!("Cannot parse line {line}")))
        })
        .collect()
}

fn parse_parameter_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    let valid_name = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    valid_name.then(|| (name, value.trim_start_matches(' ')))
}
