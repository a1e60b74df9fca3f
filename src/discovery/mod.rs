//! mDNS advertisement of the receiver

pub mod advertiser;


pub use advertiser::{
    AdvertiserConfig, AdvertiserError, RAOP_SERVICE_TYPE, RaopAdvertiser, RaopCapabilities,
};
