//! DAAP/DMAP metadata decoding
//!
//! Senders push track metadata with `SET_PARAMETER` as a DMAP listing item
//! (`mlit`) holding `code(4) length(4) value` records.

mod dmap;

#[cfg(test)]
mod tests;

pub use dmap::{DmapDecodeError, DmapEncoder, DmapParser, DmapTag, DmapValue};

/// Content type of DMAP-encoded metadata bodies
pub const DMAP_CONTENT_TYPE: &str = "application/x-dmap-tagged";
