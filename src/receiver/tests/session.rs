use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::audio::{AudioSink, CaptureSink, pcm_codec_factory};
use crate::error::SessionError;
use crate::protocol::crypto::ReceiverKey;
use crate::protocol::daap::{DMAP_CONTENT_TYPE, DmapEncoder, DmapTag};
use crate::protocol::rtsp::headers::{names, raop};
use crate::protocol::rtsp::{Method, RtspRequest, StatusCode, TransportSpec};
use crate::receiver::config::ReceiverConfig;
use crate::receiver::events::ReceiverEvent;
use crate::receiver::session::{
    PUBLIC_METHODS, RtspSession, SESSION_ID, SessionContext, SessionPhase, parse_parameters,
};
use crate::receiver::track::CurrentTrack;
use crate::testing::fixtures;

const SETUP_TRANSPORT: &str =
    "RTP/AVP/UDP;unicast;interleaved=0-1;mode=record;control_port=6001;timing_port=6002";

struct Harness {
    session: RtspSession,
    events: broadcast::Receiver<ReceiverEvent>,
    track: CurrentTrack,
    capture: CaptureSink,
    cseq: u32,
}

impl Harness {
    fn new() -> Self {
        let capture = CaptureSink::new();
        let sink = capture.clone();
        let config = ReceiverConfig::with_name("Test Speaker")
            .hardware_address(fixtures::HARDWARE_ADDRESS)
            .advertise(false)
            .codec_factory(pcm_codec_factory())
            .sink_factory(Arc::new(move || Ok(Box::new(sink.clone()) as Box<dyn AudioSink>)));

        let (events_tx, events) = broadcast::channel(64);
        let track = CurrentTrack::new();
        let context = SessionContext {
            config: Arc::new(config),
            key: Arc::new(ReceiverKey::from_pem(fixtures::TEST_KEY_PEM).unwrap()),
            events: events_tx,
            track: track.clone(),
        };

        let local: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let peer: SocketAddr = "127.0.0.1:50123".parse().unwrap();
        Self {
            session: RtspSession::new(context, local, peer),
            events,
            track,
            capture,
            cseq: 0,
        }
    }

    fn request(&mut self, method: Method) -> RtspRequest {
        self.cseq += 1;
        RtspRequest::new(method, "rtsp://127.0.0.1/3413821438").with_cseq(self.cseq)
    }

    fn with_body(&mut self, method: Method, content_type: &str, body: &[u8]) -> RtspRequest {
        self.request(method).with_body(content_type, body)
    }

    async fn announce(&mut self, encrypted: bool) {
        let request = self.with_body(
            Method::Announce,
            "application/sdp",
            fixtures::pcm_sdp(encrypted).as_bytes(),
        );
        let reply = self.session.handle(&request).await.unwrap();
        assert_eq!(reply.response.status, StatusCode::OK);
    }

    async fn set_parameters(&mut self, body: &str) -> Result<StatusCode, SessionError> {
        let request = self.with_body(Method::SetParameter, "text/parameters", body.as_bytes());
        Ok(self.session.handle(&request).await?.response.status)
    }

    fn drain_events(&mut self) -> Vec<ReceiverEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

#[test]
fn test_parse_parameters() {
    let parsed = parse_parameters("volume: -15.0\r\nprogress: 1/2/3\r\n").unwrap();
    assert_eq!(parsed, vec![("volume", "-15.0"), ("progress", "1/2/3")]);
}

#[test]
fn test_parse_parameters_skips_blank_lines() {
    let parsed = parse_parameters("\nvolume:-3\n\n").unwrap();
    assert_eq!(parsed, vec![("volume", "-3")]);
}

#[test]
fn test_parse_parameters_rejects_malformed_line() {
    assert!(parse_parameters("volume -15.0\n").is_err());
    assert!(parse_parameters(": -15.0\n").is_err());
    assert!(parse_parameters("vol ume: 1\n").is_err());
}

#[tokio::test]
async fn test_options_lists_methods() {
    let mut h = Harness::new();
    let request = h.request(Method::Options);

    let reply = h.session.handle(&request).await.unwrap();
    assert!(!reply.close);
    assert_eq!(reply.response.status, StatusCode::OK);
    assert_eq!(reply.response.cseq(), Some(1));
    assert_eq!(reply.response.header(names::PUBLIC), Some(PUBLIC_METHODS));
    assert_eq!(
        reply.response.header(raop::AUDIO_JACK_STATUS),
        Some(raop::AUDIO_JACK_CONNECTED)
    );
}

#[tokio::test]
async fn test_missing_cseq_is_error() {
    let h = Harness::new();
    let request = RtspRequest::new(Method::Options, "*");

    let err = h.session.handle(&request).await.unwrap_err();
    assert!(matches!(err, SessionError::Protocol(_)));
    assert_eq!(
        RtspSession::error_response(&request).status,
        StatusCode::INTERNAL_ERROR
    );
}

#[tokio::test]
async fn test_apple_challenge_is_signed() {
    let mut h = Harness::new();
    let mut request = h.request(Method::Options);
    request
        .headers
        .insert(raop::APPLE_CHALLENGE, fixtures::CHALLENGE);

    let reply = h.session.handle(&request).await.unwrap();
    assert_eq!(
        reply.response.header(raop::APPLE_RESPONSE),
        Some(fixtures::APPLE_RESPONSE)
    );
}

#[tokio::test]
async fn test_bad_challenge_fails_request() {
    let mut h = Harness::new();
    let mut request = h.request(Method::Options);
    request.headers.insert(raop::APPLE_CHALLENGE, "AAEC");

    assert!(h.session.handle(&request).await.is_err());
}

#[tokio::test]
async fn test_announce_builds_pipeline() {
    let mut h = Harness::new();
    h.announce(false).await;

    assert_eq!(h.session.phase().await, SessionPhase::Announced);
    let stream = h.session.stream().await.unwrap();
    assert_eq!(stream.format_index, 96);
    assert!(!stream.encrypted);
    assert_eq!(stream.format.frames_per_packet, 352);
    assert_eq!(h.session.gain().await, Some(0.0));

    let events = h.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        ReceiverEvent::StreamAnnounced {
            format_index: 96,
            encrypted: false,
            ..
        }
    )));
}

#[tokio::test]
async fn test_announce_encrypted_stream() {
    let mut h = Harness::new();
    h.announce(true).await;

    assert!(h.session.stream().await.unwrap().encrypted);
}

#[tokio::test]
async fn test_announce_wrong_content_type() {
    let mut h = Harness::new();
    let request = h.with_body(Method::Announce, "text/plain", b"v=0\r\n");

    let err = h.session.handle(&request).await.unwrap_err();
    assert!(matches!(err, SessionError::Protocol(_)));
    assert_eq!(h.session.phase().await, SessionPhase::Idle);
}

#[tokio::test]
async fn test_reannounce_replaces_stream() {
    let mut h = Harness::new();
    h.announce(false).await;
    h.set_parameters("volume: -20.0\n").await.unwrap();
    h.drain_events();

    h.announce(true).await;
    assert!(h.session.stream().await.unwrap().encrypted);
    assert_eq!(h.session.gain().await, Some(0.0));

    let events = h.drain_events();
    assert!(matches!(events[0], ReceiverEvent::SessionReset { .. }));
    assert!(matches!(events[1], ReceiverEvent::StreamAnnounced { encrypted: true, .. }));
}

#[tokio::test]
async fn test_setup_opens_channels() {
    let mut h = Harness::new();
    h.announce(false).await;

    let mut request = h.request(Method::Setup);
    request.headers.insert(names::TRANSPORT, SETUP_TRANSPORT);
    let reply = h.session.handle(&request).await.unwrap();

    assert_eq!(reply.response.status, StatusCode::OK);
    assert_eq!(reply.response.header(names::SESSION), Some(SESSION_ID));

    let transport = TransportSpec::parse(reply.response.header(names::TRANSPORT).unwrap()).unwrap();
    assert!(transport.get("unicast").is_some());
    assert_eq!(
        transport.get("interleaved").and_then(|o| o.value.as_deref()),
        Some("0-1")
    );
    assert_eq!(
        transport.get("mode").and_then(|o| o.value.as_deref()),
        Some("record")
    );
    let control = transport.get("control_port").unwrap().port().unwrap();
    let timing = transport.get("timing_port").unwrap().port().unwrap();
    let server = transport.get("server_port").unwrap().port().unwrap();
    assert_ne!(control, 6001);
    assert_ne!(timing, 6002);
    assert_ne!(server, 0);
    assert_eq!(h.session.phase().await, SessionPhase::SetUp);
}

#[tokio::test]
async fn test_setup_requires_announce() {
    let mut h = Harness::new();

    let mut request = h.request(Method::Setup);
    request.headers.insert(names::TRANSPORT, SETUP_TRANSPORT);
    let err = h.session.handle(&request).await.unwrap_err();

    assert!(matches!(err, SessionError::Protocol(_)));
    assert_eq!(h.session.phase().await, SessionPhase::Idle);
    // Nothing was opened, so there is nothing to reset
    h.session.reset().await;
    assert!(h.drain_events().is_empty());
}

#[tokio::test]
async fn test_reannounce_releases_channels() {
    let mut h = Harness::new();
    h.announce(false).await;

    let mut request = h.request(Method::Setup);
    request.headers.insert(names::TRANSPORT, SETUP_TRANSPORT);
    let reply = h.session.handle(&request).await.unwrap();
    let transport = TransportSpec::parse(reply.response.header(names::TRANSPORT).unwrap()).unwrap();
    let ports: Vec<u16> = ["server_port", "control_port", "timing_port"]
        .into_iter()
        .map(|name| transport.get(name).unwrap().port().unwrap())
        .collect();

    h.announce(false).await;
    assert_eq!(h.session.phase().await, SessionPhase::Announced);

    for port in ports {
        std::net::UdpSocket::bind(("127.0.0.1", port))
            .unwrap_or_else(|e| panic!("port {port} still held: {e}"));
    }
}

#[tokio::test]
async fn test_setup_rejects_unsupported_transport() {
    let mut h = Harness::new();
    h.announce(false).await;

    for transport in [
        "RTP/AVP/UDP;unicast;interleaved=2-3;mode=record",
        "RTP/AVP/UDP;unicast;mode=play",
        "RTP/AVP/TCP;unicast;mode=record",
    ] {
        let mut request = h.request(Method::Setup);
        request.headers.insert(names::TRANSPORT, transport);
        assert!(h.session.handle(&request).await.is_err(), "{transport}");
    }

    let request = h.request(Method::Setup);
    assert!(h.session.handle(&request).await.is_err());
}

#[tokio::test]
async fn test_record_requires_announce() {
    let mut h = Harness::new();
    let request = h.request(Method::Record);
    assert!(h.session.handle(&request).await.is_err());

    h.announce(false).await;
    let request = h.request(Method::Record);
    let reply = h.session.handle(&request).await.unwrap();
    assert_eq!(reply.response.status, StatusCode::OK);
    assert_eq!(h.session.phase().await, SessionPhase::Recording);
}

#[tokio::test]
async fn test_volume_round_trip() {
    let mut h = Harness::new();
    h.announce(false).await;
    h.drain_events();

    assert_eq!(h.set_parameters("volume: -15.0\r\n").await.unwrap(), StatusCode::OK);
    assert_eq!(h.session.gain().await, Some(-15.0));
    assert_eq!(h.drain_events(), vec![ReceiverEvent::VolumeChanged { db: -15.0 }]);

    let request = h.request(Method::GetParameter);
    let reply = h.session.handle(&request).await.unwrap();
    assert_eq!(reply.response.body_text(), "volume: -15.0\r\n");
}

#[tokio::test]
async fn test_volume_is_clamped() {
    let mut h = Harness::new();
    h.announce(false).await;

    h.set_parameters("volume: -200\n").await.unwrap();
    assert_eq!(h.session.gain().await, Some(-144.0));

    h.set_parameters("volume: 12\n").await.unwrap();
    assert_eq!(h.session.gain().await, Some(0.0));
}

#[tokio::test]
async fn test_malformed_parameters_leave_volume() {
    let mut h = Harness::new();
    h.announce(false).await;
    h.set_parameters("volume: -10.0\n").await.unwrap();

    assert!(h.set_parameters("volume -15.0\n").await.is_err());
    assert!(h.set_parameters("volume: loud\n").await.is_err());
    assert!(h.set_parameters("volume: -15.0\ngarbage\n").await.is_err());
    assert_eq!(h.session.gain().await, Some(-10.0));
}

#[tokio::test]
async fn test_volume_without_stream_is_accepted() {
    let mut h = Harness::new();

    assert_eq!(h.set_parameters("volume: -15.0\n").await.unwrap(), StatusCode::OK);
    assert_eq!(h.session.gain().await, None);

    let request = h.request(Method::GetParameter);
    let reply = h.session.handle(&request).await.unwrap();
    assert!(reply.response.body.is_empty());
}

#[tokio::test]
async fn test_dmap_metadata_updates_track() {
    let mut h = Harness::new();
    let mut item = DmapEncoder::new();
    item.string(DmapTag::ItemName, "Song");
    item.string(DmapTag::SongArtist, "Artist");
    item.string(DmapTag::SongAlbum, "Album");
    let mut body = DmapEncoder::new();
    body.container(DmapTag::ListingItem, item);

    let request = h.with_body(Method::SetParameter, DMAP_CONTENT_TYPE, &body.finish());
    h.session.handle(&request).await.unwrap();

    let track = h.track.get().unwrap();
    assert_eq!(track.title.as_deref(), Some("Song"));
    assert_eq!(track.artist.as_deref(), Some("Artist"));
    assert_eq!(track.album.as_deref(), Some("Album"));
}

#[tokio::test]
async fn test_artwork_is_stored() {
    let mut h = Harness::new();
    let request = h.with_body(Method::SetParameter, "image/jpeg", &[0xFF, 0xD8, 0xFF]);
    h.session.handle(&request).await.unwrap();

    let artwork = h.track.get().unwrap().artwork.unwrap();
    assert_eq!(artwork.data, vec![0xFF, 0xD8, 0xFF]);
    assert_eq!(artwork.mime_type, "image/jpeg");
}

#[tokio::test]
async fn test_unknown_content_type_ignored() {
    let mut h = Harness::new();
    let request = h.with_body(Method::SetParameter, "application/x-foo", b"anything");
    let reply = h.session.handle(&request).await.unwrap();
    assert_eq!(reply.response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_pause_not_valid() {
    let mut h = Harness::new();

    let request = h.request(Method::Pause);
    let reply = h.session.handle(&request).await.unwrap();
    assert_eq!(reply.response.status, StatusCode::METHOD_NOT_VALID);
    assert_eq!(reply.response.cseq(), Some(1));

    let request = h.request(Method::Other("DESCRIBE".to_string()));
    let reply = h.session.handle(&request).await.unwrap();
    assert_eq!(reply.response.status, StatusCode::METHOD_NOT_VALID);
}

#[tokio::test]
async fn test_flush_emits_event() {
    let mut h = Harness::new();
    let request = h.request(Method::Flush);
    h.session.handle(&request).await.unwrap();
    assert!(h.drain_events().is_empty());

    h.announce(false).await;
    h.drain_events();
    let request = h.request(Method::Flush);
    h.session.handle(&request).await.unwrap();
    assert!(matches!(
        h.drain_events().as_slice(),
        [ReceiverEvent::StreamFlushed { .. }]
    ));
}

#[tokio::test]
async fn test_teardown_resets_and_closes() {
    let mut h = Harness::new();
    h.announce(false).await;
    h.drain_events();

    let request = h.request(Method::Teardown);
    let reply = h.session.handle(&request).await.unwrap();
    assert!(reply.close);
    assert_eq!(reply.response.status, StatusCode::OK);
    assert_eq!(h.session.phase().await, SessionPhase::Torndown);
    assert_eq!(h.session.stream().await, None);
    assert!(h.capture.log().closed);
    assert!(matches!(
        h.drain_events().as_slice(),
        [ReceiverEvent::SessionReset { .. }]
    ));

    // Resetting again is harmless
    h.session.reset().await;
    assert!(h.drain_events().is_empty());
}
