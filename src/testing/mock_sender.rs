//! Scripted AirTunes sender
//!
//! Plays the iTunes side of a session against a receiver: RTSP over TCP
//! plus the three RTP sockets, so tests can drive a real server end to end.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use crate::protocol::rtp::{AudioPacket, RtpPacket, SyncPacket};
use crate::protocol::rtsp::headers::names;
use crate::protocol::rtsp::{Headers, Method, RtspRequest, RtspResponse, StatusCode, TransportSpec};

const USER_AGENT: &str = "iTunes/10.6 (Macintosh; Intel Mac OS X 10.7.3) AppleWebKit/534.53.11";

/// Errors from the mock sender
#[derive(Debug, thiserror::Error)]
pub enum MockSenderError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Receiver closed the connection
    #[error("Connection closed by receiver")]
    Closed,

    /// Response could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// RTP sockets not set up
    #[error("SETUP has not completed")]
    NotSetup,
}

/// Ports the receiver reported in SETUP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerPorts {
    /// `server_port`
    pub audio: u16,
    /// Echoed `control_port`
    pub control: Option<u16>,
    /// Echoed `timing_port`
    pub timing: Option<u16>,
}

/// Mock AirTunes sender
#[derive(Debug)]
pub struct MockSender {
    receiver_addr: SocketAddr,
    stream: TcpStream,
    buffer: BytesMut,
    cseq: u32,
    audio_socket: Option<UdpSocket>,
    control_socket: Option<UdpSocket>,
    timing_socket: Option<UdpSocket>,
    server_ports: Option<ServerPorts>,
    sequence: u16,
    timestamp: u32,
}

impl MockSender {
    /// SSRC of every audio packet sent
    pub const SSRC: u32 = 0x1234_5678;

    /// Connect to a receiver
    ///
    /// # Errors
    /// Returns `MockSenderError` if the connection fails.
    pub async fn connect(receiver_addr: SocketAddr) -> Result<Self, MockSenderError> {
        let stream = TcpStream::connect(receiver_addr).await?;
        Ok(Self {
            receiver_addr,
            stream,
            buffer: BytesMut::with_capacity(4096),
            cseq: 0,
            audio_socket: None,
            control_socket: None,
            timing_socket: None,
            server_ports: None,
            sequence: 0,
            timestamp: 0,
        })
    }

    fn uri(&self) -> String {
        format!("rtsp://{}/3413821438", self.receiver_addr.ip())
    }

    fn local_ip(&self) -> IpAddr {
        self.receiver_addr.ip()
    }

    /// Ports from the last successful SETUP
    #[must_use]
    pub fn server_ports(&self) -> Option<ServerPorts> {
        self.server_ports
    }

    /// Send a request with the next `CSeq` and wait for the response
    ///
    /// # Errors
    /// Returns `MockSenderError` if the exchange fails.
    pub async fn request(
        &mut self,
        method: Method,
        headers: &[(&str, &str)],
        body: Option<(&str, &[u8])>,
    ) -> Result<RtspResponse, MockSenderError> {
        self.cseq += 1;
        let mut request = RtspRequest::new(method, self.uri())
            .with_cseq(self.cseq)
            .with_header(names::USER_AGENT, USER_AGENT);
        for (name, value) in headers {
            request = request.with_header(*name, *value);
        }
        if let Some((content_type, data)) = body {
            request = request.with_body(content_type, data);
        }

        let message = request.encode();
        self.send_raw(&message).await?;
        self.read_response().await
    }

    /// Write raw bytes to the RTSP connection
    ///
    /// # Errors
    /// Returns `MockSenderError::Io` if the write fails.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<(), MockSenderError> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    /// Read one response
    ///
    /// # Errors
    /// Returns `MockSenderError::Closed` on EOF and
    /// `MockSenderError::InvalidResponse` for malformed responses.
    pub async fn read_response(&mut self) -> Result<RtspResponse, MockSenderError> {
        loop {
            if let Some(response) = self.try_parse()? {
                return Ok(response);
            }
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(MockSenderError::Closed);
            }
        }
    }

    /// Wait for the receiver to close the connection
    ///
    /// Returns `true` if EOF arrived within `timeout`.
    pub async fn wait_closed(&mut self, timeout: Duration) -> bool {
        let mut scratch = [0u8; 512];
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.stream.read(&mut scratch)).await {
                Ok(Ok(0) | Err(_)) => return true,
                Ok(Ok(_)) => {}
                Err(_) => return false,
            }
        }
    }

    fn try_parse(&mut self) -> Result<Option<RtspResponse>, MockSenderError> {
        let Some(end) = self.buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
            return Ok(None);
        };
        let head = std::str::from_utf8(&self.buffer[..end])
            .map_err(|_| MockSenderError::InvalidResponse("non UTF-8 head".to_string()))?;

        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap_or_default();
        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default().to_string();
        let status = parts
            .next()
            .and_then(|s| s.parse().ok())
            .map(StatusCode)
            .ok_or_else(|| MockSenderError::InvalidResponse(status_line.to_string()))?;
        let reason = parts.next().unwrap_or_default().to_string();

        let mut headers = Headers::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| MockSenderError::InvalidResponse(line.to_string()))?;
            headers.insert(name.trim(), value.trim());
        }

        let body_len = headers.content_length().unwrap_or(0);
        if self.buffer.len() < end + 4 + body_len {
            return Ok(None);
        }
        self.buffer.advance(end + 4);
        let body = self.buffer.split_to(body_len).to_vec();

        Ok(Some(RtspResponse {
            version,
            status,
            reason,
            headers,
            body,
        }))
    }

    /// OPTIONS
    ///
    /// # Errors
    /// Returns `MockSenderError` if the exchange fails.
    pub async fn options(&mut self) -> Result<RtspResponse, MockSenderError> {
        self.request(Method::Options, &[], None).await
    }

    /// ANNOUNCE with an SDP body
    ///
    /// # Errors
    /// Returns `MockSenderError` if the exchange fails.
    pub async fn announce(&mut self, sdp: &str) -> Result<RtspResponse, MockSenderError> {
        self.request(
            Method::Announce,
            &[],
            Some(("application/sdp", sdp.as_bytes())),
        )
        .await
    }

    /// SETUP with local control and timing sockets, as iTunes does
    ///
    /// # Errors
    /// Returns `MockSenderError` if binding or the exchange fails.
    pub async fn setup(&mut self) -> Result<RtspResponse, MockSenderError> {
        let control = UdpSocket::bind(SocketAddr::new(self.local_ip(), 0)).await?;
        let timing = UdpSocket::bind(SocketAddr::new(self.local_ip(), 0)).await?;
        let transport = format!(
            "RTP/AVP/UDP;unicast;interleaved=0-1;mode=record;control_port={};timing_port={}",
            control.local_addr()?.port(),
            timing.local_addr()?.port()
        );
        self.control_socket = Some(control);
        self.timing_socket = Some(timing);
        self.setup_with_transport(&transport).await
    }

    /// SETUP with an explicit Transport header
    ///
    /// # Errors
    /// Returns `MockSenderError` if the exchange fails.
    pub async fn setup_with_transport(
        &mut self,
        transport: &str,
    ) -> Result<RtspResponse, MockSenderError> {
        let response = self
            .request(Method::Setup, &[(names::TRANSPORT, transport)], None)
            .await?;

        if response.is_success() {
            let spec = response
                .header(names::TRANSPORT)
                .and_then(|t| TransportSpec::parse(t).ok())
                .ok_or_else(|| MockSenderError::InvalidResponse("Transport".to_string()))?;
            let port = |name: &str| spec.get(name).and_then(|o| o.port().ok());
            self.server_ports = Some(ServerPorts {
                audio: port("server_port").ok_or(MockSenderError::NotSetup)?,
                control: port("control_port"),
                timing: port("timing_port"),
            });
            self.audio_socket = Some(UdpSocket::bind(SocketAddr::new(self.local_ip(), 0)).await?);
        }

        Ok(response)
    }

    /// RECORD
    ///
    /// # Errors
    /// Returns `MockSenderError` if the exchange fails.
    pub async fn record(&mut self) -> Result<RtspResponse, MockSenderError> {
        let rtp_info = format!("seq={};rtptime={}", self.sequence, self.timestamp);
        self.request(
            Method::Record,
            &[(names::RANGE, "npt=0-"), (names::RTP_INFO, &rtp_info)],
            None,
        )
        .await
    }

    /// FLUSH
    ///
    /// # Errors
    /// Returns `MockSenderError` if the exchange fails.
    pub async fn flush(&mut self) -> Result<RtspResponse, MockSenderError> {
        let rtp_info = format!("seq={};rtptime={}", self.sequence, self.timestamp);
        self.request(Method::Flush, &[(names::RTP_INFO, &rtp_info)], None)
            .await
    }

    /// TEARDOWN
    ///
    /// # Errors
    /// Returns `MockSenderError` if the exchange fails.
    pub async fn teardown(&mut self) -> Result<RtspResponse, MockSenderError> {
        self.request(Method::Teardown, &[], None).await
    }

    /// SET_PARAMETER with an arbitrary body
    ///
    /// # Errors
    /// Returns `MockSenderError` if the exchange fails.
    pub async fn set_parameter(
        &mut self,
        content_type: &str,
        body: &[u8],
    ) -> Result<RtspResponse, MockSenderError> {
        self.request(Method::SetParameter, &[], Some((content_type, body)))
            .await
    }

    /// SET_PARAMETER `volume: <db>`
    ///
    /// # Errors
    /// Returns `MockSenderError` if the exchange fails.
    pub async fn set_volume(&mut self, db: f32) -> Result<RtspResponse, MockSenderError> {
        let body = format!("volume: {db:?}\n");
        self.set_parameter("text/parameters", body.as_bytes()).await
    }

    /// GET_PARAMETER `volume`
    ///
    /// # Errors
    /// Returns `MockSenderError` if the exchange fails.
    pub async fn get_volume(&mut self) -> Result<RtspResponse, MockSenderError> {
        self.request(
            Method::GetParameter,
            &[],
            Some(("text/parameters", b"volume\r\n")),
        )
        .await
    }

    /// Send the next audio packet and advance sequence and timestamp
    ///
    /// Returns the sequence number used.
    ///
    /// # Errors
    /// Returns `MockSenderError` if SETUP has not completed or sending fails.
    pub async fn send_audio(
        &mut self,
        payload: &[u8],
        frames: u32,
    ) -> Result<u16, MockSenderError> {
        let sequence = self.sequence;
        self.send_audio_packet(sequence, self.timestamp, payload).await?;
        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(frames);
        Ok(sequence)
    }

    /// Send an audio packet with explicit sequence and timestamp
    ///
    /// # Errors
    /// Returns `MockSenderError` if SETUP has not completed or sending fails.
    pub async fn send_audio_packet(
        &self,
        sequence: u16,
        timestamp: u32,
        payload: &[u8],
    ) -> Result<(), MockSenderError> {
        let socket = self.audio_socket.as_ref().ok_or(MockSenderError::NotSetup)?;
        let ports = self.server_ports.ok_or(MockSenderError::NotSetup)?;
        let packet = RtpPacket::Audio(AudioPacket::new(
            sequence,
            timestamp,
            Self::SSRC,
            Bytes::copy_from_slice(payload),
        ));
        socket
            .send_to(&packet.encode(), SocketAddr::new(self.receiver_addr.ip(), ports.audio))
            .await?;
        Ok(())
    }

    /// Send a sync packet from the control socket
    ///
    /// # Errors
    /// Returns `MockSenderError` if SETUP has not completed or sending fails.
    pub async fn send_sync(&self, sync: SyncPacket) -> Result<(), MockSenderError> {
        let socket = self.control_socket.as_ref().ok_or(MockSenderError::NotSetup)?;
        let port = self
            .server_ports
            .and_then(|p| p.control)
            .ok_or(MockSenderError::NotSetup)?;
        socket
            .send_to(
                &RtpPacket::Sync(sync).encode(),
                SocketAddr::new(self.receiver_addr.ip(), port),
            )
            .await?;
        Ok(())
    }

    /// Send any packet from the timing socket to the receiver's timing port
    ///
    /// # Errors
    /// Returns `MockSenderError` if SETUP has not completed or sending fails.
    pub async fn send_timing(&self, packet: &RtpPacket) -> Result<(), MockSenderError> {
        let socket = self.timing_socket.as_ref().ok_or(MockSenderError::NotSetup)?;
        let port = self
            .server_ports
            .and_then(|p| p.timing)
            .ok_or(MockSenderError::NotSetup)?;
        socket
            .send_to(&packet.encode(), SocketAddr::new(self.receiver_addr.ip(), port))
            .await?;
        Ok(())
    }

    /// Next packet the receiver sent to our control port
    pub async fn recv_control(&self, timeout: Duration) -> Option<RtpPacket> {
        recv_packet(self.control_socket.as_ref()?, timeout).await
    }

    /// Next packet the receiver sent to our timing port
    pub async fn recv_timing(&self, timeout: Duration) -> Option<RtpPacket> {
        recv_packet(self.timing_socket.as_ref()?, timeout).await
    }
}

async fn recv_packet(socket: &UdpSocket, timeout: Duration) -> Option<RtpPacket> {
    let mut buf = vec![0u8; 2048];
    let (len, _) = tokio::time::timeout(timeout, socket.recv_from(&mut buf))
        .await
        .ok()?
        .ok()?;
    RtpPacket::decode(Bytes::copy_from_slice(&buf[..len])).ok()
}
