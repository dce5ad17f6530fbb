//! Protocol errors

use thiserror::Error;

/// Errors that can occur while decoding or reassembling frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("No complete frame available in stream")]
    NoFrameAvailable,

    #[error("Incomplete frame: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },

    #[error("Unterminated run of {len} unrecognized bytes")]
    UnterminatedGarbage { len: usize },

    #[error("Malformed ACK: expected 0x11 after 0x13, got {found:#04x}")]
    MalformedAck { found: u8 },

    #[error("Payload too large: {len} bytes exceeds 16-bit length field")]
    PayloadTooLarge { len: usize },
}
