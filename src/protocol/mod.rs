//! Protocol layer: wire formats with no I/O

#![allow(missing_docs)]

pub mod crypto;
pub mod daap;
pub mod rtp;
pub mod rtsp;
pub mod sdp;
