//! RTSP Transport header parsing
//!
//! The Transport header in SETUP requests describes how audio will be delivered.
//! Format: `RTP/AVP/UDP;unicast;interleaved=0-1;mode=record;control_port=6001;timing_port=6002`
//!
//! Options are kept in request order so the receiver can echo unknown ones
//! back verbatim.

use std::fmt;

/// The only transport profile RAOP receivers accept
pub const RAOP_PROTOCOL: &str = "RTP/AVP/UDP";

/// A single `key` or `key=value` option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOption {
    /// Option name
    pub name: String,
    /// Value after `=`, if any
    pub value: Option<String>,
}

impl TransportOption {
    /// Create an option with a value
    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Create a bare flag option
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Parse the value as a port number
    ///
    /// # Errors
    /// Returns `TransportParseError::InvalidPort` if the value is missing or
    /// not a valid port.
    pub fn port(&self) -> Result<u16, TransportParseError> {
        self.value
            .as_deref()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| TransportParseError::InvalidPort(self.to_string()))
    }

    fn parse(token: &str) -> Result<Self, TransportParseError> {
        let (name, value) = match token.split_once('=') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (token, None),
        };

        let valid_name = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid_name {
            return Err(TransportParseError::InvalidOption(token.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            value,
        })
    }
}

impl fmt::Display for TransportOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.name, value),
            None => f.write_str(&self.name),
        }
    }
}

/// Parsed Transport header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSpec {
    /// Leading protocol token
    pub protocol: String,
    /// Options in the order they appeared
    pub options: Vec<TransportOption>,
}

impl TransportSpec {
    /// Create an empty RAOP transport
    #[must_use]
    pub fn new() -> Self {
        Self {
            protocol: RAOP_PROTOCOL.to_string(),
            options: Vec::new(),
        }
    }

    /// Parse a Transport header value
    ///
    /// # Errors
    /// Returns `TransportParseError` if the protocol is not `RTP/AVP/UDP` or
    /// an option is not of the form `name[=value]`.
    pub fn parse(value: &str) -> Result<Self, TransportParseError> {
        let mut parts = value.split(';');

        let protocol = parts
            .next()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(TransportParseError::MissingProtocol)?;

        if protocol != RAOP_PROTOCOL {
            return Err(TransportParseError::UnsupportedProtocol(protocol.to_string()));
        }

        let options = parts
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(TransportOption::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            protocol: protocol.to_string(),
            options,
        })
    }

    /// Find an option by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TransportOption> {
        self.options.iter().find(|o| o.name == name)
    }

    /// Append an option
    pub fn push(&mut self, option: TransportOption) {
        self.options.push(option);
    }
}

impl Default for TransportSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransportSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.protocol)?;
        for option in &self.options {
            write!(f, ";{option}")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportParseError {
    #[error("Missing protocol specification")]
    MissingProtocol,

    #[error("Transport protocol must be RTP/AVP/UDP, but was {0}")]
    UnsupportedProtocol(String),

    #[error("Cannot understand Transport option {0}")]
    InvalidOption(String),

    #[error("Invalid port in {0}")]
    InvalidPort(String),
}
