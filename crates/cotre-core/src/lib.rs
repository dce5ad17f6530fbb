//! # cotre Core Library
//!
//! Core functionality for decoding captured cotre link-layer traffic.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Frame encoding/decoding (ACK, data frames and unknown byte runs)
//! - Per-direction stream reassembly from arbitrarily chunked input
//! - Hex dump formatting for payloads and raw chunks
//! - Capture file readers (libpcap USB captures, JSON chunk logs)
//! - Session handling for host and device streams
//!
//! ## Example
//!
//! ```rust,ignore
//! use cotre_core::protocol::Stream;
//!
//! let mut stream = Stream::new();
//! stream.append(&[0xAD, 0x00, 0x02, 0xAA, 0xBB, 0x11]);
//!
//! while stream.has_frame() {
//!     let frame = stream.pop_frame()?;
//!     println!("{}", frame.dump("> "));
//! }
//! ```

pub mod capture;
pub mod config;
pub mod hexdump;
pub mod protocol;
pub mod session;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::capture::{open_capture, CaptureError, CaptureFormat, Chunk, Direction};
    pub use crate::config::DecoderConfig;
    pub use crate::hexdump::{hex_dump, hex_dump_with_prefix};
    pub use crate::protocol::{ChecksumStatus, Frame, Payload, ProtocolError, Stream};
    pub use crate::session::{DecodedFrame, Session, SessionSummary};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
