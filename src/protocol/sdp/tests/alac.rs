use crate::protocol::sdp::{AlacParameters, SdpError};

#[test]
fn test_parse_itunes_fmtp() {
    let options = "352 0 16 40 10 14 2 255 0 0 44100"
        .split(' ')
        .collect::<Vec<_>>();
    let params = AlacParameters::parse(&options).unwrap();

    assert_eq!(params.frames_per_packet, 352);
    assert_eq!(params.bit_depth, 16);
    assert_eq!(params.pb, 40);
    assert_eq!(params.mb, 10);
    assert_eq!(params.kb, 14);
    assert_eq!(params.channels, 2);
    assert_eq!(params.max_run, 255);
    assert_eq!(params.sample_rate, 44100);
}

#[test]
fn test_parse_rejects_wrong_field_count() {
    let options = ["352", "0", "16"];
    assert!(matches!(
        AlacParameters::parse(&options),
        Err(SdpError::InvalidAlacParameters(_))
    ));
}

#[test]
fn test_parse_rejects_non_numeric() {
    let options = [
        "352", "0", "sixteen", "40", "10", "14", "2", "255", "0", "0", "44100",
    ];
    match AlacParameters::parse(&options) {
        Err(SdpError::InvalidAlacParameters(msg)) => assert!(msg.contains("bit_depth")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_magic_cookie_layout() {
    let options = "352 0 16 40 10 14 2 255 0 0 44100"
        .split(' ')
        .collect::<Vec<_>>();
    let cookie = AlacParameters::parse(&options).unwrap().to_magic_cookie();

    assert_eq!(&cookie[0..4], &352u32.to_be_bytes());
    assert_eq!(cookie[4], 0);
    assert_eq!(cookie[5], 16);
    assert_eq!(&cookie[6..10], &[40, 10, 14, 2]);
    assert_eq!(&cookie[10..12], &255u16.to_be_bytes());
    assert_eq!(&cookie[20..24], &44100u32.to_be_bytes());
}
