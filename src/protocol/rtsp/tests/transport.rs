use crate::protocol::rtsp::transport::{TransportOption, TransportParseError, TransportSpec};

#[test]
fn test_parse_itunes_transport() {
    let transport = TransportSpec::parse(
        "RTP/AVP/UDP;unicast;interleaved=0-1;mode=record;control_port=6001;timing_port=6002",
    )
    .unwrap();

    assert_eq!(transport.protocol, "RTP/AVP/UDP");
    assert_eq!(transport.options.len(), 5);
    assert_eq!(transport.options[0], TransportOption::flag("unicast"));
    assert_eq!(transport.get("interleaved").unwrap().value.as_deref(), Some("0-1"));
    assert_eq!(transport.get("control_port").unwrap().port().unwrap(), 6001);
    assert_eq!(transport.get("timing_port").unwrap().port().unwrap(), 6002);
}

#[test]
fn test_reject_other_profiles() {
    for value in ["RTP/AVP/TCP;unicast", "RTP/AVP;unicast", "rtp/avp/udp"] {
        assert!(matches!(
            TransportSpec::parse(value),
            Err(TransportParseError::UnsupportedProtocol(_))
        ));
    }
    assert!(matches!(
        TransportSpec::parse(""),
        Err(TransportParseError::MissingProtocol)
    ));
}

#[test]
fn test_reject_malformed_option() {
    assert!(matches!(
        TransportSpec::parse("RTP/AVP/UDP;unicast;bad option"),
        Err(TransportParseError::InvalidOption(_))
    ));
    assert!(matches!(
        TransportSpec::parse("RTP/AVP/UDP;=5"),
        Err(TransportParseError::InvalidOption(_))
    ));
}

#[test]
fn test_invalid_port() {
    let transport = TransportSpec::parse("RTP/AVP/UDP;control_port=70000").unwrap();
    assert!(matches!(
        transport.get("control_port").unwrap().port(),
        Err(TransportParseError::InvalidPort(_))
    ));
}

#[test]
fn test_display_preserves_order() {
    let mut transport = TransportSpec::new();
    transport.push(TransportOption::flag("unicast"));
    transport.push(TransportOption::with_value("mode", "record"));
    transport.push(TransportOption::with_value("x-vendor", "a=b"));
    transport.push(TransportOption::with_value("server_port", "53561"));

    assert_eq!(
        transport.to_string(),
        "RTP/AVP/UDP;unicast;mode=record;x-vendor=a=b;server_port=53561"
    );
}
