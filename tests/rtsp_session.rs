mod common;

use std::time::Duration;

use raop_receiver::protocol::rtsp::headers::{names, raop};
use raop_receiver::protocol::rtsp::{Method, StatusCode, TransportSpec};
use raop_receiver::receiver::session::{PUBLIC_METHODS, SESSION_ID};
use raop_receiver::testing::{MockSender, MockSenderError, fixtures};
use raop_receiver::{RaopReceiver, ReceiverError, ReceiverEvent, ReceiverState};

use common::{start_receiver, wait_for_event};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn test_receiver_start_stop() {
    let mut test = start_receiver().await;
    assert_eq!(test.receiver.state().await, ReceiverState::Running);
    assert_eq!(test.receiver.local_addr(), Some(test.addr));

    let event = wait_for_event(&mut test.events, |_| true).await;
    match event {
        ReceiverEvent::Started { port, .. } => assert_eq!(port, test.addr.port()),
        other => panic!("Expected Started event, got {other:?}"),
    }

    test.receiver.stop().await.unwrap();
    wait_for_event(&mut test.events, |e| matches!(e, ReceiverEvent::Stopped)).await;
    assert_eq!(test.receiver.state().await, ReceiverState::Stopped);
    assert_eq!(test.receiver.local_addr(), None);
}

#[tokio::test]
async fn test_start_twice_fails() {
    let mut test = start_receiver().await;

    let err = test.receiver.start().await.unwrap_err();
    assert!(matches!(err, ReceiverError::AlreadyRunning));

    test.receiver.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_key_fails_start() {
    let capture = raop_receiver::CaptureSink::new();
    let config = common::config(&capture).private_key_pem("not a key");
    let mut receiver = RaopReceiver::new(config);

    assert!(matches!(
        receiver.start().await,
        Err(ReceiverError::Key(_))
    ));
    assert_eq!(receiver.state().await, ReceiverState::Stopped);
}

#[tokio::test]
async fn test_options() {
    let test = start_receiver().await;
    let mut sender = MockSender::connect(test.addr).await.unwrap();

    let response = sender.options().await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.cseq(), Some(1));
    assert_eq!(response.header(names::PUBLIC), Some(PUBLIC_METHODS));
    assert_eq!(
        response.header(raop::AUDIO_JACK_STATUS),
        Some(raop::AUDIO_JACK_CONNECTED)
    );

    // The connection stays open
    let response = sender.options().await.unwrap();
    assert_eq!(response.cseq(), Some(2));
}

#[tokio::test]
async fn test_apple_challenge() {
    let test = start_receiver().await;
    let mut sender = MockSender::connect(test.addr).await.unwrap();

    let response = sender
        .request(
            Method::Options,
            &[(raop::APPLE_CHALLENGE, fixtures::CHALLENGE)],
            None,
        )
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.header(raop::APPLE_RESPONSE),
        Some(fixtures::APPLE_RESPONSE)
    );
}

#[tokio::test]
async fn test_pause_is_not_valid() {
    let test = start_receiver().await;
    let mut sender = MockSender::connect(test.addr).await.unwrap();

    let response = sender.request(Method::Pause, &[], None).await.unwrap();
    assert_eq!(response.status, StatusCode::METHOD_NOT_VALID);
    assert_eq!(response.cseq(), Some(1));

    let response = sender.options().await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_cseq_closes_connection() {
    let test = start_receiver().await;
    let mut sender = MockSender::connect(test.addr).await.unwrap();

    sender.send_raw(b"OPTIONS * RTSP/1.0\r\n\r\n").await.unwrap();
    let response = sender.read_response().await.unwrap();
    assert_eq!(response.status, StatusCode::INTERNAL_ERROR);
    assert_eq!(response.cseq(), None);
    assert!(sender.wait_closed(CLOSE_TIMEOUT).await);
}

#[tokio::test]
async fn test_announce_content_type_mismatch() {
    let mut test = start_receiver().await;
    let mut sender = MockSender::connect(test.addr).await.unwrap();

    let response = sender
        .request(Method::Announce, &[], Some(("text/plain", b"v=0\r\n")))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::INTERNAL_ERROR);
    assert_eq!(response.cseq(), Some(1));
    assert!(sender.wait_closed(CLOSE_TIMEOUT).await);

    let event = wait_for_event(&mut test.events, |e| {
        matches!(e, ReceiverEvent::ClientDisconnected { .. })
    })
    .await;
    let ReceiverEvent::ClientDisconnected { reason, .. } = event else {
        unreachable!();
    };
    assert!(reason.contains("content type"), "{reason}");
}

#[tokio::test]
async fn test_full_session() {
    let mut test = start_receiver().await;
    let mut sender = MockSender::connect(test.addr).await.unwrap();

    let response = sender.announce(&fixtures::pcm_sdp(true)).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    wait_for_event(&mut test.events, |e| {
        matches!(
            e,
            ReceiverEvent::StreamAnnounced {
                format_index: 96,
                encrypted: true,
                ..
            }
        )
    })
    .await;

    let response = sender.setup().await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header(names::SESSION), Some(SESSION_ID));
    let transport = TransportSpec::parse(response.header(names::TRANSPORT).unwrap()).unwrap();
    assert!(transport.get("unicast").is_some());
    assert_eq!(
        transport.get("mode").and_then(|o| o.value.as_deref()),
        Some("record")
    );
    let ports = sender.server_ports().unwrap();
    assert_ne!(ports.audio, 0);
    assert!(ports.control.is_some());
    assert!(ports.timing.is_some());

    let response = sender.record().await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    wait_for_event(&mut test.events, |e| {
        matches!(e, ReceiverEvent::StreamStarted { .. })
    })
    .await;

    let response = sender.set_volume(-15.0).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    let event = wait_for_event(&mut test.events, |e| {
        matches!(e, ReceiverEvent::VolumeChanged { .. })
    })
    .await;
    assert_eq!(event, ReceiverEvent::VolumeChanged { db: -15.0 });

    let response = sender.get_volume().await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body_text(), "volume: -15.0\r\n");

    let response = sender.flush().await.unwrap();
    assert_eq!(response.status, StatusCode::OK);

    let response = sender.teardown().await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert!(sender.wait_closed(CLOSE_TIMEOUT).await);

    wait_for_event(&mut test.events, |e| {
        matches!(e, ReceiverEvent::ClientDisconnected { .. })
    })
    .await;
}

#[tokio::test]
async fn test_reannounce_resets_stream() {
    let mut test = start_receiver().await;
    let mut sender = MockSender::connect(test.addr).await.unwrap();

    sender.announce(&fixtures::pcm_sdp(false)).await.unwrap();
    sender.setup().await.unwrap();
    sender.announce(&fixtures::pcm_sdp(true)).await.unwrap();

    wait_for_event(&mut test.events, |e| {
        matches!(e, ReceiverEvent::SessionReset { .. })
    })
    .await;
    wait_for_event(&mut test.events, |e| {
        matches!(e, ReceiverEvent::StreamAnnounced { encrypted: true, .. })
    })
    .await;
}

#[tokio::test]
async fn test_malformed_volume_fails_request() {
    let test = start_receiver().await;
    let mut sender = MockSender::connect(test.addr).await.unwrap();

    sender.announce(&fixtures::pcm_sdp(false)).await.unwrap();
    let response = sender
        .set_parameter("text/parameters", b"volume -15.0\r\n")
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::INTERNAL_ERROR);
    assert!(sender.wait_closed(CLOSE_TIMEOUT).await);
}

#[tokio::test]
async fn test_record_before_announce_fails() {
    let test = start_receiver().await;
    let mut sender = MockSender::connect(test.addr).await.unwrap();

    let response = sender.record().await.unwrap();
    assert_eq!(response.status, StatusCode::INTERNAL_ERROR);
    assert!(sender.wait_closed(CLOSE_TIMEOUT).await);
}

#[tokio::test]
async fn test_stop_closes_connections() {
    let mut test = start_receiver().await;
    let mut sender = MockSender::connect(test.addr).await.unwrap();
    sender.options().await.unwrap();

    test.receiver.stop().await.unwrap();
    assert!(sender.wait_closed(CLOSE_TIMEOUT).await);
    assert!(matches!(
        sender.options().await,
        Err(MockSenderError::Closed | MockSenderError::Io(_))
    ));
}

#[tokio::test]
async fn test_concurrent_connections() {
    let test = start_receiver().await;
    let mut first = MockSender::connect(test.addr).await.unwrap();
    let mut second = MockSender::connect(test.addr).await.unwrap();

    first.announce(&fixtures::pcm_sdp(false)).await.unwrap();
    second.announce(&fixtures::pcm_sdp(true)).await.unwrap();

    first.teardown().await.unwrap();
    assert!(first.wait_closed(CLOSE_TIMEOUT).await);

    let response = second.options().await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
}
