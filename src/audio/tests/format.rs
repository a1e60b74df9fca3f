use std::time::Duration;

use crate::audio::format::*;

#[test]
fn test_audio_format_bytes() {
    let format = AudioFormat::AIRTUNES;

    assert_eq!(format.bytes_per_frame(), 4); // 2 bytes * 2 channels
}

#[test]
fn test_duration_conversion() {
    let format = AudioFormat::AIRTUNES;

    assert_eq!(format.duration_to_frames(Duration::from_secs(1)), 44100);
    assert_eq!(format.frames_to_duration(22050), Duration::from_millis(500));
}

#[test]
fn test_sample_rate_from_hz() {
    assert_eq!(SampleRate::from_hz(44100), Some(SampleRate::Hz44100));
    assert_eq!(SampleRate::from_hz(96000), Some(SampleRate::Hz96000));
    assert_eq!(SampleRate::from_hz(22050), None);
}

#[test]
fn test_channel_config_from_count() {
    assert_eq!(ChannelConfig::from_count(1), Some(ChannelConfig::Mono));
    assert_eq!(ChannelConfig::from_count(2), Some(ChannelConfig::Stereo));
    assert_eq!(ChannelConfig::from_count(6), None);
}

#[test]
fn test_samples_per_packet() {
    let info = FormatInfo {
        format: AudioFormat::AIRTUNES,
        frames_per_packet: 352,
    };

    assert_eq!(info.samples_per_packet(), 704);
}
