use super::Headers;

/// RTSP status codes this receiver sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const METHOD_NOT_VALID: StatusCode = StatusCode(455);
    pub const INTERNAL_ERROR: StatusCode = StatusCode(500);

    /// 2xx
    #[must_use]
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Reason phrase for the status line
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            453 => "Not Enough Bandwidth",
            454 => "Session Not Found",
            455 => "Method Not Valid",
            461 => "Unsupported Transport",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            _ => "Unknown",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}

/// A response as it appears on the wire
#[derive(Debug, Clone)]
pub struct RtspResponse {
    /// Protocol token of the status line
    pub version: String,
    /// Status code
    pub status: StatusCode,
    /// Reason phrase
    pub reason: String,
    /// Headers in wire order
    pub headers: Headers,
    /// Body, empty when there is none
    pub body: Vec<u8>,
}

impl RtspResponse {
    /// Check for a 2xx status
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Echoed `CSeq`
    #[must_use]
    pub fn cseq(&self) -> Option<u32> {
        self.headers.cseq()
    }

    /// Look up a header value
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Body as text, lossily decoded
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
