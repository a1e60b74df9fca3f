//! RTP sockets and routing
//!
//! SETUP opens up to three UDP sockets. The control and timing sockets are
//! connected to the sender's ports; the audio socket is not, since senders
//! may stream from any source port. All three feed the same
//! [`AudioPipeline`](super::pipeline::AudioPipeline) and replies leave
//! through the socket of the channel they belong to.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::events::ReceiverEvent;
use super::pipeline::{AudioPipeline, StageOutput};
use super::session::SharedState;
use crate::protocol::rtp::RtpPacket;
use crate::protocol::rtp::constants::MAX_DATAGRAM;

/// Logical RTP channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Audio data from the sender
    Audio,
    /// Sync packets and retransmits
    Control,
    /// Clock exchange
    Timing,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Audio => "audio",
            Self::Control => "control",
            Self::Timing => "timing",
        })
    }
}

/// Sockets and tasks opened by SETUP
#[derive(Default)]
pub(crate) struct RtpChannels {
    audio: Option<Arc<UdpSocket>>,
    control: Option<Arc<UdpSocket>>,
    timing: Option<Arc<UdpSocket>>,
    tasks: Vec<JoinHandle<()>>,
}

impl RtpChannels {
    /// Bind a socket on `local_ip` and connect it to the sender's port
    ///
    /// Returns the locally bound port.
    pub(crate) async fn open_connected(
        &mut self,
        channel: Channel,
        local_ip: IpAddr,
        remote: SocketAddr,
    ) -> io::Result<u16> {
        let socket = UdpSocket::bind(SocketAddr::new(local_ip, 0)).await?;
        socket.connect(remote).await?;
        let port = socket.local_addr()?.port();
        debug!(%channel, port, %remote, "Opened RTP channel");
        self.set(channel, Arc::new(socket));
        Ok(port)
    }

    /// Bind a socket on `local_ip` that accepts datagrams from anywhere
    pub(crate) async fn open_unconnected(
        &mut self,
        channel: Channel,
        local_ip: IpAddr,
    ) -> io::Result<u16> {
        let socket = UdpSocket::bind(SocketAddr::new(local_ip, 0)).await?;
        let port = socket.local_addr()?.port();
        debug!(%channel, port, "Opened RTP channel");
        self.set(channel, Arc::new(socket));
        Ok(port)
    }

    fn set(&mut self, channel: Channel, socket: Arc<UdpSocket>) {
        let slot = match channel {
            Channel::Audio => &mut self.audio,
            Channel::Control => &mut self.control,
            Channel::Timing => &mut self.timing,
        };
        *slot = Some(socket);
    }

    /// Whether any socket is open
    pub(crate) fn is_open(&self) -> bool {
        self.audio.is_some() || self.control.is_some() || self.timing.is_some()
    }

    /// Sockets replies are sent through
    pub(crate) fn outbound(&self) -> (Option<Arc<UdpSocket>>, Option<Arc<UdpSocket>>) {
        (self.control.clone(), self.timing.clone())
    }

    /// Spawn one receive loop per socket and the periodic tick
    pub(crate) fn start(
        &mut self,
        state: &SharedState,
        events: &broadcast::Sender<ReceiverEvent>,
        poll_interval: Duration,
        timing_interval: Duration,
    ) {
        let sockets = [
            (Channel::Audio, self.audio.clone()),
            (Channel::Control, self.control.clone()),
            (Channel::Timing, self.timing.clone()),
        ];
        for (channel, socket) in sockets {
            if let Some(socket) = socket {
                self.tasks.push(tokio::spawn(receive_loop(
                    channel,
                    socket,
                    Arc::clone(state),
                    events.clone(),
                )));
            }
        }

        self.tasks.push(tokio::spawn(tick_loop(
            Arc::clone(state),
            events.clone(),
            poll_interval,
            timing_interval,
        )));
    }

    /// Stop all tasks and drop our socket handles
    ///
    /// The aborted tasks still hold their sockets until they are next polled;
    /// awaiting the returned handles guarantees the ports are released.
    #[must_use = "await the tasks to know the ports are free"]
    pub(crate) fn close(&mut self) -> Vec<JoinHandle<()>> {
        for task in &self.tasks {
            task.abort();
        }
        if self.is_open() {
            debug!("Closing RTP channels");
        }
        self.audio = None;
        self.control = None;
        self.timing = None;
        std::mem::take(&mut self.tasks)
    }
}

impl Drop for RtpChannels {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl fmt::Debug for RtpChannels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let port = |s: &Option<Arc<UdpSocket>>| {
            s.as_ref()
                .and_then(|s| s.local_addr().ok())
                .map(|a| a.port())
        };
        f.debug_struct("RtpChannels")
            .field("audio", &port(&self.audio))
            .field("control", &port(&self.control))
            .field("timing", &port(&self.timing))
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

/// Handles copied out of the session for one unit of work
#[derive(Clone)]
pub(crate) struct Routes {
    pub(crate) pipeline: Arc<AudioPipeline>,
    pub(crate) control: Option<Arc<UdpSocket>>,
    pub(crate) timing: Option<Arc<UdpSocket>>,
}

impl Routes {
    /// Send replies and report abandoned packets
    ///
    /// Replies to a closed or busy socket are dropped.
    pub(crate) fn dispatch(&self, output: StageOutput, events: &broadcast::Sender<ReceiverEvent>) {
        for packet in output.outbound {
            let (channel, socket) = match &packet {
                RtpPacket::RetransmitRequest(_) | RtpPacket::RetransmitResponse(_) => {
                    (Channel::Control, &self.control)
                }
                RtpPacket::TimingRequest(_) | RtpPacket::TimingResponse(_) => {
                    (Channel::Timing, &self.timing)
                }
                other => {
                    debug!(kind = other.kind(), "No outbound channel for packet");
                    continue;
                }
            };

            let Some(socket) = socket else {
                trace!(%channel, kind = packet.kind(), "Channel not open, dropping packet");
                continue;
            };
            if let Err(e) = socket.try_send(&packet.encode()) {
                trace!(%channel, kind = packet.kind(), error = %e, "Dropping outbound packet");
            }
        }

        if !output.abandoned.is_empty() {
            let _ = events.send(ReceiverEvent::PacketsAbandoned {
                sequences: output.abandoned,
            });
        }
    }
}

async fn receive_loop(
    channel: Channel,
    socket: Arc<UdpSocket>,
    state: SharedState,
    events: broadcast::Sender<ReceiverEvent>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let len = match socket.recv_from(&mut buf).await {
            Ok((len, _)) => len,
            // ICMP errors surface on connected sockets; the sender may come back
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
                ) =>
            {
                trace!(%channel, error = %e, "Ignoring socket error");
                continue;
            }
            Err(e) => {
                warn!(%channel, error = %e, "RTP receive failed, closing channel");
                break;
            }
        };

        let data = Bytes::copy_from_slice(&buf[..len]);
        let packet = match RtpPacket::decode(data.clone()) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(%channel, len, error = %e, "Undecodable RTP packet");
                RtpPacket::Unknown(data)
            }
        };
        trace!(%channel, kind = packet.kind(), len, "Received RTP packet");

        let Some(routes) = state.lock().await.routes() else {
            trace!(%channel, "No audio pipeline, dropping packet");
            continue;
        };
        let output = routes.pipeline.process(packet);
        routes.dispatch(output, &events);
    }
}

async fn tick_loop(
    state: SharedState,
    events: broadcast::Sender<ReceiverEvent>,
    poll_interval: Duration,
    timing_interval: Duration,
) {
    let mut poll = tokio::time::interval(poll_interval);
    let mut timing = tokio::time::interval(timing_interval);

    loop {
        let send_timing = tokio::select! {
            _ = poll.tick() => false,
            _ = timing.tick() => true,
        };

        let Some(routes) = state.lock().await.routes() else {
            continue;
        };

        let mut output = routes.pipeline.poll_retransmits();
        if send_timing && routes.timing.is_some() {
            output.outbound.push(routes.pipeline.timing_request());
        }
        routes.dispatch(output, &events);
    }
}
