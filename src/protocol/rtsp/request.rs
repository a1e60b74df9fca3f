use std::fmt::Write;

use super::{Headers, Method, headers::names};

/// A parsed RTSP request
#[derive(Debug, Clone)]
pub struct RtspRequest {
    /// Method token
    pub method: Method,
    /// Request URI, `*` for OPTIONS
    pub uri: String,
    /// Headers in wire order
    pub headers: Headers,
    /// Body, empty when there is none
    pub body: Vec<u8>,
}

impl RtspRequest {
    /// Create a request with no headers or body
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the `CSeq` header
    #[must_use]
    pub fn with_cseq(self, cseq: u32) -> Self {
        self.with_header(names::CSEQ, cseq.to_string())
    }

    /// Attach a body and its `Content-Type`
    #[must_use]
    pub fn with_body(mut self, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        self.headers.insert(names::CONTENT_TYPE, content_type);
        self.body = body.into();
        self
    }

    /// Look up a header value
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Serialize as a sender would
    ///
    /// `Content-Length` is derived from the body and any stale value is
    /// dropped.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut head = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);
        for (name, value) in self.headers.iter() {
            if name.eq_ignore_ascii_case(names::CONTENT_LENGTH) {
                continue;
            }
            let _ = write!(head, "{name}: {value}\r\n");
        }
        if !self.body.is_empty() {
            let _ = write!(head, "{}: {}\r\n", names::CONTENT_LENGTH, self.body.len());
        }
        head.push_str("\r\n");

        let mut output = head.into_bytes();
        output.extend_from_slice(&self.body);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_without_body() {
        let encoded = RtspRequest::new(Method::Options, "*")
            .with_cseq(1)
            .with_header("Apple-Challenge", "AAECAwQFBgcICQoLDA0ODw")
            .encode();

        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            "OPTIONS * RTSP/1.0\r\nCSeq: 1\r\nApple-Challenge: AAECAwQFBgcICQoLDA0ODw\r\n\r\n"
        );
    }

    #[test]
    fn test_encode_sets_content_length() {
        let encoded = RtspRequest::new(Method::SetParameter, "rtsp://10.0.0.2/3413821438")
            .with_cseq(5)
            .with_header(names::CONTENT_LENGTH, "999")
            .with_body("text/parameters", "volume: -15.0\r\n")
            .encode();
        let text = String::from_utf8(encoded).unwrap();

        assert!(text.contains("Content-Type: text/parameters\r\n"));
        assert!(text.contains("Content-Length: 15\r\n"));
        assert!(!text.contains("999"));
        assert!(text.ends_with("\r\n\r\nvolume: -15.0\r\n"));
    }

    #[test]
    fn test_method_names() {
        for name in [
            "OPTIONS",
            "ANNOUNCE",
            "SETUP",
            "RECORD",
            "PAUSE",
            "FLUSH",
            "TEARDOWN",
            "SET_PARAMETER",
            "GET_PARAMETER",
        ] {
            let method = Method::parse(name);
            assert!(!matches!(method, Method::Other(_)), "{name}");
            assert_eq!(method.as_str(), name);
        }
    }

    #[test]
    fn test_unknown_method_is_kept() {
        assert_eq!(Method::parse("DESCRIBE"), Method::Other("DESCRIBE".to_string()));
        // Tokens are case-sensitive on the wire
        assert!(matches!(Method::parse("options"), Method::Other(_)));
    }
}
