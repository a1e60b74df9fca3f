//! `Apple-Challenge` / `Apple-Response` authentication
//!
//! Senders prove they talk to a genuine AirPort Express by sending 16 random
//! bytes; the receiver signs them together with its own IP and hardware
//! address using the device private key.

use std::net::IpAddr;

use base64::Engine as _;

use crate::error::SessionError;
use crate::protocol::crypto::{BASE64_LENIENT, ReceiverKey, lengths};

/// Challenge, IPv6-sized address and hardware address
const SIGNED_LEN: usize = lengths::CHALLENGE + 16 + lengths::HW_ADDRESS;

/// Compute the `Apple-Response` header value
///
/// `local_ip` is the address the sender connected to. IPv4-mapped IPv6
/// addresses are signed as their IPv4 form.
///
/// # Errors
/// Returns a protocol error if the challenge is not base64 for exactly 16
/// bytes, a crypto error if signing fails.
pub fn apple_response(
    challenge: &str,
    local_ip: IpAddr,
    hardware_address: &[u8; lengths::HW_ADDRESS],
    key: &ReceiverKey,
) -> Result<String, SessionError> {
    let challenge = BASE64_LENIENT
        .decode(challenge.trim())
        .map_err(|_| SessionError::protocol("Invalid Apple-Challenge header, not base64"))?;
    if challenge.len() != lengths::CHALLENGE {
        return Err(SessionError::protocol(format!(
            "Invalid Apple-Challenge header, {} instead of {} bytes",
            challenge.len(),
            lengths::CHALLENGE
        )));
    }

    let mut message = Vec::with_capacity(SIGNED_LEN);
    message.extend_from_slice(&challenge);
    match local_ip {
        IpAddr::V4(ip) => message.extend_from_slice(&ip.octets()),
        IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
            Some(v4) => message.extend_from_slice(&v4.octets()),
            None => message.extend_from_slice(&ip.octets()),
        },
    }
    message.extend_from_slice(hardware_address);
    message.resize(SIGNED_LEN, 0);

    let signature = key.sign_challenge(&message)?;
    Ok(BASE64_LENIENT.encode(signature))
}
