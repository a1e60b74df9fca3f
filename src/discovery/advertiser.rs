//! RAOP service advertisement
//!
//! Senders find AirTunes receivers by browsing `_raop._tcp`. The instance
//! name is `<hardware address>@<device name>` and the TXT record describes
//! what the receiver accepts.

use std::collections::HashMap;

use mdns_sd::{Error as MdnsError, ServiceDaemon, ServiceInfo};

use crate::receiver::config::format_hardware_address;

/// Service type senders browse for
pub const RAOP_SERVICE_TYPE: &str = "_raop._tcp.local.";

/// Errors from service advertisement
#[derive(Debug, thiserror::Error)]
pub enum AdvertiserError {
    /// mDNS error
    #[error("mDNS error: {0}")]
    Mdns(#[from] MdnsError),

    /// Service not registered
    #[error("Service not registered")]
    NotRegistered,

    /// Service already registered
    #[error("Service already registered")]
    AlreadyRegistered,
}

/// Receiver capabilities published in the TXT record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaopCapabilities {
    /// Audio channels
    pub channels: u8,
    /// Codecs: 0=PCM, 1=ALAC
    pub codecs: Vec<u8>,
    /// Encryption types: 0=none, 1=RSA+AES
    pub encryption_types: Vec<u8>,
    /// Metadata types: 0=text, 1=artwork, 2=progress
    pub metadata_types: Vec<u8>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bits per sample
    pub sample_size: u8,
    /// Password required
    pub password_required: bool,
    /// RAOP protocol version
    pub protocol_version: u8,
    /// AirTunes server version
    pub server_version: String,
}

impl Default for RaopCapabilities {
    fn default() -> Self {
        Self {
            channels: 2,
            codecs: vec![0, 1],
            encryption_types: vec![0, 1],
            metadata_types: vec![0, 1, 2],
            sample_rate: 44_100,
            sample_size: 16,
            password_required: false,
            protocol_version: 3,
            server_version: "130.14".to_string(),
        }
    }
}

impl RaopCapabilities {
    /// TXT record entries in publication order
    #[must_use]
    pub fn txt_records(&self) -> Vec<(String, String)> {
        let entries = [
            ("txtvers", "1".to_string()),
            ("ch", self.channels.to_string()),
            ("cn", format_list(&self.codecs)),
            ("et", format_list(&self.encryption_types)),
            ("sv", "false".to_string()),
            ("da", "true".to_string()),
            ("sr", self.sample_rate.to_string()),
            ("ss", self.sample_size.to_string()),
            ("pw", self.password_required.to_string()),
            ("vn", self.protocol_version.to_string()),
            ("tp", "UDP".to_string()),
            ("md", format_list(&self.metadata_types)),
            ("vs", self.server_version.clone()),
            ("sm", "false".to_string()),
            ("ek", "1".to_string()),
        ];
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }
}

fn format_list(items: &[u8]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Configuration for RAOP service advertisement
#[derive(Debug, Clone)]
pub struct AdvertiserConfig {
    /// Name shown to users
    pub name: String,
    /// RTSP port to advertise
    pub port: u16,
    /// Hardware address in the instance name
    pub hardware_address: [u8; 6],
    /// Receiver capabilities
    pub capabilities: RaopCapabilities,
}

impl AdvertiserConfig {
    /// `<HWADDR>@<name>` instance name
    #[must_use]
    pub fn instance_name(&self) -> String {
        format!(
            "{}@{}",
            format_hardware_address(&self.hardware_address),
            self.name
        )
    }
}

/// RAOP service advertiser
pub struct RaopAdvertiser {
    config: AdvertiserConfig,
    daemon: ServiceDaemon,
    fullname: Option<String>,
}

impl RaopAdvertiser {
    /// Create an advertiser with its own mDNS daemon
    ///
    /// # Errors
    /// Returns error if the mDNS daemon cannot be started.
    pub fn new(config: AdvertiserConfig) -> Result<Self, AdvertiserError> {
        Ok(Self {
            config,
            daemon: ServiceDaemon::new()?,
            fullname: None,
        })
    }

    /// Register the service on the network
    ///
    /// # Errors
    /// Returns error if the service is already registered or mDNS
    /// registration fails.
    pub fn register(&mut self) -> Result<(), AdvertiserError> {
        if self.fullname.is_some() {
            return Err(AdvertiserError::AlreadyRegistered);
        }

        let instance = self.config.instance_name();
        let host = hostname::get().map_or_else(
            |_| "raop-receiver".to_string(),
            |h| h.to_string_lossy().into_owned(),
        );
        let host = format!("{}.local.", host.replace(' ', "-"));
        let txt: HashMap<String, String> =
            self.config.capabilities.txt_records().into_iter().collect();

        let service = ServiceInfo::new(
            RAOP_SERVICE_TYPE,
            &instance,
            &host,
            "",
            self.config.port,
            txt,
        )?
        .enable_addr_auto();

        self.fullname = Some(service.get_fullname().to_string());
        self.daemon.register(service)?;

        tracing::info!(name = %instance, port = self.config.port, "RAOP service registered");
        Ok(())
    }

    /// Withdraw the service
    ///
    /// # Errors
    /// Returns error if the service is not registered or mDNS
    /// unregistration fails.
    pub fn unregister(&mut self) -> Result<(), AdvertiserError> {
        let fullname = self.fullname.take().ok_or(AdvertiserError::NotRegistered)?;
        self.daemon.unregister(&fullname)?;
        tracing::info!(name = %fullname, "RAOP service unregistered");
        Ok(())
    }

    /// Unregister if needed and stop the daemon
    pub fn shutdown(mut self) {
        if self.fullname.is_some() {
            if let Err(e) = self.unregister() {
                tracing::warn!(error = %e, "Failed to unregister RAOP service");
            }
        }
        if let Err(e) = self.daemon.shutdown() {
            tracing::debug!(error = %e, "mDNS daemon shutdown failed");
        }
    }
}

impl std::fmt::Debug for RaopAdvertiser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaopAdvertiser")
            .field("config", &self.config)
            .field("fullname", &self.fullname)
            .finish_non_exhaustive()
    }
}
