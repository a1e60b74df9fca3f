//! ANNOUNCE body negotiation

use base64::Engine as _;
use tracing::debug;

use super::{FormatIndex, SdpError};
use crate::protocol::crypto::{BASE64_LENIENT, CryptoMaterial, ReceiverKey};

/// What an ANNOUNCE body declared, before validation
///
/// Parsing only checks the line grammar. The three format indices are
/// cross-checked by [`AnnounceDescription::negotiate`].
#[derive(Debug, Clone, Default)]
pub struct AnnounceDescription {
    /// Format index of the `m=audio` line
    pub audio_format: FormatIndex,
    /// Format index the `rtpmap` line maps to the supported encoding
    pub codec_format: FormatIndex,
    /// Format index of the `fmtp` line
    pub fmtp_format: FormatIndex,
    /// `fmtp` tokens after the format index
    pub format_options: Option<Vec<String>>,
    /// RSA-wrapped AES key (base64-decoded)
    pub wrapped_key: Option<Vec<u8>>,
    /// AES IV (base64-decoded)
    pub aes_iv: Option<Vec<u8>>,
}

/// Result of a successful negotiation
#[derive(Debug, Clone)]
pub struct NegotiatedStream {
    /// RTP payload format index of the audio stream
    pub format_index: u32,
    /// Codec configuration tokens from `fmtp`
    pub format_options: Vec<String>,
    /// Present when the stream is encrypted
    pub crypto: Option<CryptoMaterial>,
}

impl AnnounceDescription {
    /// Parse an ANNOUNCE body
    ///
    /// `encoding_name` is the `rtpmap` encoding the installed codec decodes;
    /// `rtpmap` lines for any other encoding are ignored.
    ///
    /// # Errors
    /// Returns `SdpError` if a line does not match the `letter=value`
    /// grammar or a recognised attribute is malformed.
    pub fn parse(body: &str, encoding_name: &str) -> Result<Self, SdpError> {
        let mut description = AnnounceDescription::default();

        let body = body.replace('\r', "");
        let body = body.trim_end_matches('\n');
        if body.is_empty() {
            return Ok(description);
        }

        for line in body.split('\n') {
            let (attribute, value) = split_line(line)?;

            match attribute {
                'm' => description.audio_format = FormatIndex(Some(parse_media(value)?)),
                'a' => {
                    let (key, value) =
                        value
                            .split_once(':')
                            .filter(|(key, _)| !key.is_empty())
                            .ok_or_else(|| SdpError::InvalidSetting {
                                attribute,
                                value: value.to_string(),
                            })?;
                    description.apply_attribute(key, value, encoding_name)?;
                }
                _ => {}
            }
        }

        Ok(description)
    }

    fn apply_attribute(
        &mut self,
        key: &str,
        value: &str,
        encoding_name: &str,
    ) -> Result<(), SdpError> {
        match key {
            "rtpmap" => {
                let (index, encoding) = value
                    .split_once(' ')
                    .and_then(|(index, encoding)| Some((parse_index(index)?, encoding)))
                    .ok_or_else(|| SdpError::InvalidRtpmap(value.to_string()))?;
                if encoding == encoding_name {
                    self.codec_format = FormatIndex(Some(index));
                } else {
                    debug!(index, encoding, "Ignoring rtpmap for unsupported encoding");
                }
            }
            "fmtp" => {
                let mut parts = value.split(' ');
                let index = parts
                    .next()
                    .and_then(parse_index)
                    .ok_or_else(|| SdpError::InvalidFmtp(value.to_string()))?;
                self.fmtp_format = FormatIndex(Some(index));

                let options: Vec<String> = parts.map(str::to_string).collect();
                if !options.is_empty() {
                    self.format_options = Some(options);
                }
            }
            "rsaaeskey" => {
                self.wrapped_key = Some(decode_base64(value, "rsaaeskey")?);
            }
            "aesiv" => {
                self.aes_iv = Some(decode_base64(value, "aesiv")?);
            }
            _ => {}
        }
        Ok(())
    }

    /// Validate the declared formats and unwrap the AES key
    ///
    /// The `m` line, the `rtpmap` line and the `fmtp` line must all name the
    /// same format index and `fmtp` must carry options. Encryption is only
    /// enabled when both key and IV are present.
    ///
    /// # Errors
    /// Returns `SdpError::Crypto` if the key cannot be unwrapped, any other
    /// `SdpError` variant for inconsistent descriptions.
    pub fn negotiate(self, key: &ReceiverKey) -> Result<NegotiatedStream, SdpError> {
        if self.codec_format != self.audio_format {
            return Err(SdpError::UnsupportedFormat(self.audio_format));
        }
        if self.audio_format != self.fmtp_format {
            return Err(SdpError::MissingFmtp(self.audio_format));
        }
        let (Some(format_index), Some(format_options)) = (self.audio_format.0, self.format_options)
        else {
            return Err(SdpError::MissingFormatOptions(self.audio_format));
        };

        let crypto = match (self.wrapped_key, self.aes_iv) {
            (Some(wrapped), Some(iv)) => {
                let aes_key = zeroize::Zeroizing::new(key.unwrap_key(&wrapped)?);
                Some(CryptoMaterial::new(&aes_key, &iv)?)
            }
            _ => None,
        };

        Ok(NegotiatedStream {
            format_index,
            format_options,
            crypto,
        })
    }
}

fn split_line(line: &str) -> Result<(char, &str), SdpError> {
    let mut chars = line.chars();
    match (chars.next(), chars.next()) {
        (Some(attribute), Some('=')) if attribute.is_ascii_lowercase() => {
            Ok((attribute, &line[2..]))
        }
        _ => Err(SdpError::InvalidLine(line.to_string())),
    }
}

/// `audio <port> RTP/AVP <index>`
fn parse_media(value: &str) -> Result<u32, SdpError> {
    let invalid = || SdpError::InvalidSetting {
        attribute: 'm',
        value: value.to_string(),
    };

    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        ["audio", port, "RTP/AVP", index] if !port.is_empty() => {
            parse_index(index).ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

fn parse_index(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn decode_base64(value: &str, attribute: &'static str) -> Result<Vec<u8>, SdpError> {
    BASE64_LENIENT
        .decode(value.trim())
        .map_err(|_| SdpError::InvalidBase64 { attribute })
}
