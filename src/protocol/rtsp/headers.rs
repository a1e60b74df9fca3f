/// Header names shared with any RTSP peer
pub mod names {
    pub const CSEQ: &str = "CSeq";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const SESSION: &str = "Session";
    pub const TRANSPORT: &str = "Transport";
    pub const PUBLIC: &str = "Public";
    pub const RANGE: &str = "Range";
    pub const RTP_INFO: &str = "RTP-Info";
    pub const USER_AGENT: &str = "User-Agent";
}

/// Headers only AirTunes peers send
pub mod raop {
    /// Base64 nonce the receiver must sign
    pub const APPLE_CHALLENGE: &str = "Apple-Challenge";
    /// Signature over the challenge
    pub const APPLE_RESPONSE: &str = "Apple-Response";
    /// Reported on every response
    pub const AUDIO_JACK_STATUS: &str = "Audio-Jack-Status";
    /// The only jack status this receiver reports
    pub const AUDIO_JACK_CONNECTED: &str = "connected; type=analog";
}

/// Header list with case-insensitive lookup
///
/// Entries keep their insertion order so responses go out on the wire in
/// the order handlers built them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any entry with the same name
    ///
    /// A replaced entry keeps its position but takes the new name casing.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    /// Look up a header value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Remove a header, returning its value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index).1)
    }

    /// `CSeq` as a number
    #[must_use]
    pub fn cseq(&self) -> Option<u32> {
        self.get(names::CSEQ)?.trim().parse().ok()
    }

    /// `Content-Length` as a number
    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.get(names::CONTENT_LENGTH)?.trim().parse().ok()
    }

    /// `Content-Type`, without surrounding whitespace
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.get(names::CONTENT_TYPE).map(str::trim)
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
