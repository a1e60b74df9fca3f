//! RAOP receiver configuration

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use crate::audio::{
    CodecFactory, QueueConfig, SinkFactory, default_codec_factory, default_sink_factory,
};

use super::retransmit::RetransmitConfig;

/// Receiver configuration
#[derive(Clone)]
pub struct ReceiverConfig {
    /// Device name shown to senders
    pub name: String,

    /// RTSP listen port (0 = auto-assign)
    pub port: u16,

    /// Address the RTSP listener binds to
    pub bind_address: IpAddr,

    /// Hardware address advertised and signed into `Apple-Response`
    pub hardware_address: [u8; 6],

    /// RSA private key (PKCS#1 or PKCS#8 PEM); generated at start when absent
    pub private_key_pem: Option<String>,

    /// Output queue tuning
    pub queue: QueueConfig,

    /// Retransmit request tuning
    pub retransmit: RetransmitConfig,

    /// Interval between timing requests to the sender
    pub timing_interval: Duration,

    /// Advertise via mDNS
    pub advertise: bool,

    /// Builds a decoder for each announced stream
    pub codec_factory: CodecFactory,

    /// Builds a sink for each announced stream
    pub sink_factory: SinkFactory,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            name: "AirTunes Receiver".to_string(),
            port: 5000,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            hardware_address: random_hardware_address(),
            private_key_pem: None,
            queue: QueueConfig::default(),
            retransmit: RetransmitConfig::default(),
            timing_interval: Duration::from_secs(3),
            advertise: true,
            codec_factory: default_codec_factory(),
            sink_factory: default_sink_factory(),
        }
    }
}

impl fmt::Debug for ReceiverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverConfig")
            .field("name", &self.name)
            .field("port", &self.port)
            .field("bind_address", &self.bind_address)
            .field("hardware_address", &format_hardware_address(&self.hardware_address))
            .field("private_key_pem", &self.private_key_pem.as_ref().map(|_| "<redacted>"))
            .field("queue", &self.queue)
            .field("retransmit", &self.retransmit)
            .field("timing_interval", &self.timing_interval)
            .field("advertise", &self.advertise)
            .finish_non_exhaustive()
    }
}

impl ReceiverConfig {
    /// Create with custom name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set listen address
    #[must_use]
    pub fn bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    /// Set hardware address
    #[must_use]
    pub fn hardware_address(mut self, address: [u8; 6]) -> Self {
        self.hardware_address = address;
        self
    }

    /// Use this RSA private key instead of generating one
    #[must_use]
    pub fn private_key_pem(mut self, pem: impl Into<String>) -> Self {
        self.private_key_pem = Some(pem.into());
        self
    }

    /// Read the RSA private key from a PEM file
    ///
    /// The key is only parsed when the receiver starts.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read.
    pub fn private_key_file(self, path: impl AsRef<Path>) -> io::Result<Self> {
        let pem = std::fs::read_to_string(path)?;
        Ok(self.private_key_pem(pem))
    }

    /// Set the start latency of the output queue
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.queue.start_latency = latency;
        self
    }

    /// Set how long a lost packet is waited for
    #[must_use]
    pub fn retransmit_timeout(mut self, timeout: Duration) -> Self {
        self.retransmit.gap_timeout = timeout;
        self
    }

    /// Set the timing request interval
    #[must_use]
    pub fn timing_interval(mut self, interval: Duration) -> Self {
        self.timing_interval = interval;
        self
    }

    /// Enable or disable mDNS advertisement
    #[must_use]
    pub fn advertise(mut self, advertise: bool) -> Self {
        self.advertise = advertise;
        self
    }

    /// Use a different decoder
    #[must_use]
    pub fn codec_factory(mut self, factory: CodecFactory) -> Self {
        self.codec_factory = factory;
        self
    }

    /// Use a different sink
    #[must_use]
    pub fn sink_factory(mut self, factory: SinkFactory) -> Self {
        self.sink_factory = factory;
        self
    }
}

/// Random locally administered unicast address
fn random_hardware_address() -> [u8; 6] {
    let mut address: [u8; 6] = rand::random();
    address[0] = (address[0] | 0x02) & 0xFE;
    address
}

/// `AABBCCDDEEFF`
#[must_use]
pub fn format_hardware_address(address: &[u8; 6]) -> String {
    address.iter().map(|b| format!("{b:02X}")).collect()
}
