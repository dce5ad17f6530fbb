//! Link-Layer Protocol
//!
//! Implements the byte-oriented frame format seen on the radio's USB serial link.
//!
//! Three kinds of frames share one byte stream: two-byte ACKs, length-prefixed
//! data frames with an XOR checksum, and runs of unrecognized bytes between them.

mod error;
pub mod frame;
pub mod stream;

pub use error::ProtocolError;
pub use frame::{checksum, ChecksumStatus, Frame, FrameDump, FrameKind, Payload};
pub use stream::{Frames, Stream, StreamState};

/// First byte of an ACK frame
pub const ACK_SENTINEL: u8 = 0x13;

/// Second byte of an ACK frame
pub const ACK_TRAILER: u8 = 0x11;

/// First byte of a data frame
pub const DATA_SENTINEL: u8 = 0xAD;

/// Encoded size of an ACK frame
pub const ACK_LEN: usize = 2;

/// Framing overhead of a data frame: sentinel, 2 length bytes, checksum
pub const DATA_OVERHEAD: usize = 4;

/// Largest payload a data frame can carry (16-bit length field)
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Check whether a byte starts a recognized frame
#[inline]
pub fn is_sentinel(byte: u8) -> bool {
    byte == ACK_SENTINEL || byte == DATA_SENTINEL
}
