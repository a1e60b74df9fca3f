//! Request framing and response encoding for the receiving end
//!
//! A sender pipelines requests on one TCP stream. [`RtspServerCodec`] splits
//! them off a byte buffer, either through its own [`feed`] / [`decode`] pair
//! or as a `tokio-util` [`Decoder`], and writes [`RtspResponse`]s back.
//!
//! [`feed`]: RtspServerCodec::feed
//! [`decode`]: RtspServerCodec::decode

use std::str;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::headers::{names, raop};
use super::{Headers, Method, RtspRequest, RtspResponse, StatusCode};

/// Framing errors; the connection cannot continue after any of them
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed request line: {0}")]
    RequestLine(String),

    #[error("Malformed method token: {0}")]
    Method(String),

    #[error("Malformed header line: {0}")]
    Header(String),

    #[error("Request head exceeds {limit} bytes")]
    HeadTooLarge { limit: usize },

    #[error("Malformed Content-Length: {0}")]
    ContentLength(String),

    #[error("Body of {size} bytes exceeds {max}")]
    BodyTooLarge { size: usize, max: usize },

    #[error("Request head is not UTF-8")]
    NotUtf8,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Largest request head accepted
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Largest body accepted; cover art is the biggest payload senders push
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Sans-IO request splitter
///
/// ```rust
/// use raop_receiver::protocol::rtsp::server_codec::RtspServerCodec;
///
/// let mut codec = RtspServerCodec::new();
/// codec.feed(b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n");
///
/// if let Ok(Some(request)) = codec.decode() {
///     println!("Method: {}", request.method);
/// }
/// ```
#[derive(Debug, Default)]
pub struct RtspServerCodec {
    pending: BytesMut,
}

impl RtspServerCodec {
    /// Create a codec with an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the connection
    pub fn feed(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Bytes buffered but not yet returned as a request
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Take the next complete request, `Ok(None)` until one has arrived
    ///
    /// # Errors
    /// Returns `ParseError` if the buffered bytes cannot be a request.
    pub fn decode(&mut self) -> Result<Option<RtspRequest>, ParseError> {
        split_request(&mut self.pending)
    }
}

impl Decoder for RtspServerCodec {
    type Item = RtspRequest;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RtspRequest>, ParseError> {
        split_request(src)
    }
}

impl Encoder<RtspResponse> for RtspServerCodec {
    type Error = ParseError;

    fn encode(&mut self, item: RtspResponse, dst: &mut BytesMut) -> Result<(), ParseError> {
        write_response(&item, dst);
        Ok(())
    }
}

/// Request line and headers, before the body is known to be complete
struct RequestHead {
    method: Method,
    uri: String,
    headers: Headers,
}

impl RequestHead {
    fn parse(text: &str) -> Result<Self, ParseError> {
        let mut lines = text.split("\r\n");
        let request_line = lines.next().unwrap_or_default();

        let mut tokens = request_line.split_whitespace();
        let (Some(method), Some(uri), Some(version), None) =
            (tokens.next(), tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(ParseError::RequestLine(request_line.to_string()));
        };
        if !version.starts_with("RTSP/") {
            return Err(ParseError::RequestLine(request_line.to_string()));
        }
        if !method.bytes().all(|b| b.is_ascii_alphabetic() || b == b'_') {
            return Err(ParseError::Method(method.to_string()));
        }

        let mut headers = Headers::new();
        for line in lines.filter(|line| !line.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ParseError::Header(line.to_string()))?;
            headers.insert(name.trim(), value.trim());
        }

        Ok(Self {
            method: Method::parse(method),
            uri: uri.to_string(),
            headers,
        })
    }

    fn body_len(&self) -> Result<usize, ParseError> {
        let Some(value) = self.headers.get(names::CONTENT_LENGTH) else {
            return Ok(0);
        };
        let size = value
            .trim()
            .parse()
            .map_err(|_| ParseError::ContentLength(value.to_string()))?;
        if size > MAX_BODY_SIZE {
            return Err(ParseError::BodyTooLarge {
                size,
                max: MAX_BODY_SIZE,
            });
        }
        Ok(size)
    }
}

/// Split one request off the front of `buffer`
///
/// Nothing is consumed until the whole body has arrived.
fn split_request(buffer: &mut BytesMut) -> Result<Option<RtspRequest>, ParseError> {
    let Some(head_len) = buffer
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
    else {
        if buffer.len() > MAX_HEAD_SIZE {
            return Err(ParseError::HeadTooLarge {
                limit: MAX_HEAD_SIZE,
            });
        }
        return Ok(None);
    };

    let text = str::from_utf8(&buffer[..head_len]).map_err(|_| ParseError::NotUtf8)?;
    let head = RequestHead::parse(text)?;
    let body_start = head_len + HEAD_TERMINATOR.len();
    let body_len = head.body_len()?;

    if buffer.len() < body_start + body_len {
        buffer.reserve(body_start + body_len - buffer.len());
        return Ok(None);
    }

    let _ = buffer.split_to(body_start);
    let body = buffer.split_to(body_len).to_vec();

    Ok(Some(RtspRequest {
        method: head.method,
        uri: head.uri,
        headers: head.headers,
        body,
    }))
}

/// Fluent response construction
///
/// Headers go out in the order they were added; `Content-Length` is
/// appended last when there is a body.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl ResponseBuilder {
    /// Start a response with `status`
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// `200 OK`
    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// A failure status
    #[must_use]
    pub fn error(status: StatusCode) -> Self {
        Self::new(status)
    }

    /// Echo the request's `CSeq`
    #[must_use]
    pub fn cseq(self, cseq: u32) -> Self {
        self.header(names::CSEQ, &cseq.to_string())
    }

    /// `Session` header
    #[must_use]
    pub fn session(self, session_id: &str) -> Self {
        self.header(names::SESSION, session_id)
    }

    /// Any other header
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// `text/parameters` body, as GET_PARAMETER answers carry
    #[must_use]
    pub fn text_body(mut self, body: &str) -> Self {
        self.body = body.as_bytes().to_vec();
        self.header(names::CONTENT_TYPE, "text/parameters")
    }

    /// `Audio-Jack-Status: connected; type=analog`
    #[must_use]
    pub fn audio_jack_connected(self) -> Self {
        self.header(raop::AUDIO_JACK_STATUS, raop::AUDIO_JACK_CONNECTED)
    }

    /// Finish the response
    #[must_use]
    pub fn build(mut self) -> RtspResponse {
        if !self.body.is_empty() {
            self.headers
                .insert(names::CONTENT_LENGTH, self.body.len().to_string());
        }

        RtspResponse {
            version: "RTSP/1.0".to_string(),
            status: self.status,
            reason: self.status.reason().to_string(),
            headers: self.headers,
            body: self.body,
        }
    }

    /// Finish and serialize
    #[must_use]
    pub fn encode(self) -> Vec<u8> {
        let mut dst = BytesMut::new();
        write_response(&self.build(), &mut dst);
        dst.to_vec()
    }
}

/// Serialize `response` onto `dst`
pub fn write_response(response: &RtspResponse, dst: &mut BytesMut) {
    dst.reserve(128 + response.body.len());

    dst.put_slice(response.version.as_bytes());
    dst.put_slice(format!(" {} {}\r\n", response.status.0, response.reason).as_bytes());
    for (name, value) in response.headers.iter() {
        dst.put_slice(name.as_bytes());
        dst.put_slice(b": ");
        dst.put_slice(value.as_bytes());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
    dst.put_slice(&response.body);
}
