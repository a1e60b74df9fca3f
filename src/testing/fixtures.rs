//! Known-good protocol vectors
//!
//! All values were produced against `tests/fixtures/test_key.pem` with AES
//! key `00 01 .. 0f` and IV `10 11 .. 1f`.

/// 2048-bit RSA test key (PKCS#1 PEM)
pub const TEST_KEY_PEM: &str = include_str!("../../tests/fixtures/test_key.pem");

/// `rsaaeskey` attribute: the AES key wrapped with RSA-OAEP(SHA-1)
pub const RSA_AES_KEY: &str = "K26Z+njU2A4qQRfR499AOQJnOKBBYS6N7YX5KiqEsstfd59EsJZD/VECwcZG9kaJLBDVJP/DL6pPZdhEyoOTzkJedIVoMgzpI3+32u9lCil/1EOoX72TThd8AEPSCDT9dgxsjQrRbU2NWP6JMpAMrJ3kfGV4lkn9+JnFNTKcvrH6CP2qm7KJQ15g+rFGg0chEBaYvqhbGxBkrKoC9QxeoZ7ZEU+lQjuteMwbQD6X4yiuM8K9A/FdXMLpuiJHLzZ1rJX65+qphTd8GjzH/DRIgoi7cZFyZl0TKZOn7WKmwGI4dNmiszYaS1RkspsoZtebTOsjFOrNZDtVXt4j5fzCZg";

/// `aesiv` attribute
pub const AES_IV: &str = "EBESExQVFhcYGRobHB0eHw";

/// Unwrapped AES key
pub const AES_KEY: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
];

/// Bytes `100..140`: two CBC-encrypted blocks followed by an 8-byte clear tail
pub const CIPHERTEXT_HEX: &str =
    "bbedd27aedb27c515396335ea59cdcb7a0441da14b84c8261d8a99271088166f8485868788898a8b";

/// `Apple-Challenge` of bytes `00 01 .. 0f`
pub const CHALLENGE: &str = "AAECAwQFBgcICQoLDA0ODw";

/// Hardware address the challenge vector was signed with
pub const HARDWARE_ADDRESS: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

/// `Apple-Response` for [`CHALLENGE`] from 127.0.0.1 with [`HARDWARE_ADDRESS`]
pub const APPLE_RESPONSE: &str = "vl3Csha215tYNNePFENpSAyNoiqI0XAPi5ZLueD6gVyFBDxvJxpajwhtSli919naiKW2GBcU0Y6NwkD0GPZsJuJd0PSjAbWluXZ3vSLuuBODscoHlgUatDNon4jWZgAlpXtqZ8Tv6FV9bdtbxufwuORE+zH94HwtMjpYH6ywih4Cr8l4ObFkBxi9EDcc78pXROb6vLTipD90YCfDs9ALNrIL6H5Yn5p0kGmbXR9vmcpGplJI5xa4igwYy2JQfD+vq7h2KCeiYAD5DNXdtHTclonTuopQ9LUpUeO0uJl2qJcl1Ua7PZGFrr7Df47XmmXz7qzIKbpgg4r0xHNJSj0NIA==";

/// ANNOUNCE body for an `L16` stream
///
/// `fmtp` options are rate, channels and frames per packet.
#[must_use]
pub fn pcm_sdp(encrypted: bool) -> String {
    let mut sdp = String::from(
        "v=0\r\n\
         o=iTunes 3413821438 0 IN IP4 127.0.0.1\r\n\
         s=iTunes\r\n\
         c=IN IP4 127.0.0.1\r\n\
         t=0 0\r\n\
         m=audio 0 RTP/AVP 96\r\n\
         a=rtpmap:96 L16\r\n\
         a=fmtp:96 44100 2 352\r\n",
    );
    if encrypted {
        sdp.push_str(&format!("a=rsaaeskey:{RSA_AES_KEY}\r\na=aesiv:{AES_IV}\r\n"));
    }
    sdp
}

/// ANNOUNCE body for an Apple Lossless stream as iTunes sends it
#[must_use]
pub fn alac_sdp() -> String {
    format!(
        "v=0\r\n\
         o=iTunes 3413821438 0 IN IP4 127.0.0.1\r\n\
         s=iTunes\r\n\
         c=IN IP4 127.0.0.1\r\n\
         t=0 0\r\n\
         m=audio 0 RTP/AVP 96\r\n\
         a=rtpmap:96 AppleLossless\r\n\
         a=fmtp:96 352 0 16 40 10 14 2 255 0 0 44100\r\n\
         a=rsaaeskey:{RSA_AES_KEY}\r\n\
         a=aesiv:{AES_IV}\r\n"
    )
}
