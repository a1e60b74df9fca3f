//! Sans-IO RTSP protocol implementation for the AirTunes dialect
//!
//! Only the server side is implemented: requests are parsed from a byte
//! stream and responses are encoded back onto it. [`RtspServerCodec`] also
//! implements the `tokio-util` codec traits so a connection can be driven
//! through `Framed`.

pub mod headers;
pub mod request;
pub mod response;
pub mod server_codec;
pub mod transport;

#[cfg(test)]
mod tests;

pub use headers::Headers;
pub use request::RtspRequest;
pub use response::{RtspResponse, StatusCode};
pub use server_codec::{ParseError, ResponseBuilder, RtspServerCodec};
pub use transport::{TransportOption, TransportParseError, TransportSpec};

/// RTSP methods used by AirTunes senders
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// Capability query
    Options,
    /// Announce stream information (SDP)
    Announce,
    /// Set up transport
    Setup,
    /// Start streaming
    Record,
    /// Advertised by receivers but never sent by senders in practice
    Pause,
    /// Flush buffers
    Flush,
    /// Tear down session
    Teardown,
    /// Set parameter (volume, metadata, artwork)
    SetParameter,
    /// Get parameter (volume)
    GetParameter,
    /// Any method this receiver does not know
    Other(String),
}

impl Method {
    /// Convert to RTSP method string
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Method::Options => "OPTIONS",
            Method::Announce => "ANNOUNCE",
            Method::Setup => "SETUP",
            Method::Record => "RECORD",
            Method::Pause => "PAUSE",
            Method::Flush => "FLUSH",
            Method::Teardown => "TEARDOWN",
            Method::SetParameter => "SET_PARAMETER",
            Method::GetParameter => "GET_PARAMETER",
            Method::Other(name) => name,
        }
    }

    /// Parse from the request line token
    ///
    /// Never fails: unknown tokens become [`Method::Other`] so the server
    /// can answer them with `455 Method Not Valid`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "OPTIONS" => Method::Options,
            "ANNOUNCE" => Method::Announce,
            "SETUP" => Method::Setup,
            "RECORD" => Method::Record,
            "PAUSE" => Method::Pause,
            "FLUSH" => Method::Flush,
            "TEARDOWN" => Method::Teardown,
            "SET_PARAMETER" => Method::SetParameter,
            "GET_PARAMETER" => Method::GetParameter,
            other => Method::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
