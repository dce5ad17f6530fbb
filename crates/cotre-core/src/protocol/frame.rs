//! Frame encoding/decoding
//!
//! Frame formats on the wire:
//! - ACK: `13 11`
//! - Data: `AD`, 2 bytes payload length (big-endian), N bytes payload,
//!   1 byte checksum (XOR of the payload bytes)
//! - Unknown: any run of bytes up to, but not including, the next `13` or `AD`

use byteorder::{BigEndian, ByteOrder};
use std::fmt;
use std::ops::Deref;

use super::{
    is_sentinel, ProtocolError, ACK_LEN, ACK_SENTINEL, ACK_TRAILER, DATA_OVERHEAD, DATA_SENTINEL,
    MAX_PAYLOAD_SIZE,
};
use crate::hexdump::hex_dump_with_prefix;

/// Immutable byte content carried by a frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Wrap raw bytes
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Number of payload bytes, excluding any framing
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Take ownership of the raw bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    /// XOR checksum over the payload
    pub fn checksum(&self) -> u8 {
        checksum(&self.0)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl From<&[u8]> for Payload {
    fn from(data: &[u8]) -> Self {
        Self(data.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Payload {
    fn from(data: [u8; N]) -> Self {
        Self(data.to_vec())
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// Running XOR of every byte, seeded at zero
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

/// Outcome of comparing a stored checksum against the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStatus {
    /// Stored checksum matches the payload
    Valid,
    /// Stored checksum disagrees with the recomputed one
    Mismatch {
        /// Checksum byte found on the wire
        stored: u8,
        /// Checksum computed from the payload
        computed: u8,
    },
}

impl ChecksumStatus {
    /// Check if the checksum matched
    pub fn is_valid(&self) -> bool {
        matches!(self, ChecksumStatus::Valid)
    }
}

/// Frame type without its content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// ACK frame
    Ack,
    /// Data frame
    Data,
    /// Run of unrecognized bytes
    Unknown,
}

/// A single protocol unit extracted from a byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Acknowledge, no payload
    Ack,
    /// Length-delimited payload with the checksum as stored on the wire
    Data {
        /// Frame payload
        payload: Payload,
        /// Stored checksum byte (may disagree with the payload)
        checksum: u8,
    },
    /// Bytes that do not start a recognized frame
    Unknown {
        /// The unrecognized bytes, verbatim
        bytes: Payload,
    },
}

impl Frame {
    /// Create a data frame with a correct checksum
    pub fn data(payload: impl Into<Payload>) -> Result<Self, ProtocolError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge { len: payload.len() });
        }
        let checksum = payload.checksum();
        Ok(Frame::Data { payload, checksum })
    }

    /// Create an unknown frame from raw bytes
    pub fn unknown(bytes: impl Into<Payload>) -> Self {
        Frame::Unknown {
            bytes: bytes.into(),
        }
    }

    /// The frame type
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Ack => FrameKind::Ack,
            Frame::Data { .. } => FrameKind::Data,
            Frame::Unknown { .. } => FrameKind::Unknown,
        }
    }

    /// Number of stream bytes this frame occupies
    pub fn wire_len(&self) -> usize {
        match self {
            Frame::Ack => ACK_LEN,
            Frame::Data { payload, .. } => DATA_OVERHEAD + payload.len(),
            Frame::Unknown { bytes } => bytes.len(),
        }
    }

    /// Content bytes: the payload of a data frame or the raw bytes of an unknown run
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Frame::Ack => None,
            Frame::Data { payload, .. } => Some(payload),
            Frame::Unknown { bytes } => Some(bytes),
        }
    }

    /// Checksum byte as stored on the wire, data frames only
    pub fn checksum(&self) -> Option<u8> {
        match self {
            Frame::Data { checksum, .. } => Some(*checksum),
            _ => None,
        }
    }

    /// Checksum recomputed from the payload, data frames only
    pub fn computed_checksum(&self) -> Option<u8> {
        match self {
            Frame::Data { payload, .. } => Some(payload.checksum()),
            _ => None,
        }
    }

    /// Compare stored and recomputed checksum
    ///
    /// Returns `None` for frames that carry no checksum.
    pub fn checksum_status(&self) -> Option<ChecksumStatus> {
        match self {
            Frame::Data { payload, checksum } => {
                let computed = payload.checksum();
                if computed == *checksum {
                    Some(ChecksumStatus::Valid)
                } else {
                    Some(ChecksumStatus::Mismatch {
                        stored: *checksum,
                        computed,
                    })
                }
            }
            _ => None,
        }
    }

    /// Decode the frame at the head of `data`
    ///
    /// Trailing bytes after the first frame are ignored. A checksum mismatch
    /// is not an error; use [`Frame::checksum_status`] to detect it.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let len = frame_len(data)?;

        let frame = match data[0] {
            ACK_SENTINEL => Frame::Ack,
            DATA_SENTINEL => Frame::Data {
                payload: Payload::from(&data[3..len - 1]),
                checksum: data[len - 1],
            },
            _ => Frame::unknown(&data[..len]),
        };
        Ok(frame)
    }

    /// Encode the frame to raw bytes
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut bytes = Vec::with_capacity(self.wire_len());
        self.encode_into(&mut bytes)?;
        Ok(bytes)
    }

    /// Append the encoded frame to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
        match self {
            Frame::Ack => out.extend_from_slice(&[ACK_SENTINEL, ACK_TRAILER]),
            Frame::Data { payload, checksum } => {
                if payload.len() > MAX_PAYLOAD_SIZE {
                    return Err(ProtocolError::PayloadTooLarge { len: payload.len() });
                }
                let mut header = [DATA_SENTINEL, 0, 0];
                BigEndian::write_u16(&mut header[1..], payload.len() as u16);
                out.extend_from_slice(&header);
                out.extend_from_slice(payload);
                out.push(*checksum);
            }
            Frame::Unknown { bytes } => out.extend_from_slice(bytes),
        }
        Ok(())
    }

    /// Human readable dump, every line starting with `prefix`
    pub fn dump<'a>(&'a self, prefix: &'a str) -> FrameDump<'a> {
        FrameDump {
            frame: self,
            prefix,
        }
    }
}

/// Length of the complete frame at the head of `data`
///
/// Errors when the head does not hold a complete frame yet, or can never
/// become one (malformed ACK).
fn frame_len(data: &[u8]) -> Result<usize, ProtocolError> {
    frame_len_after(data, 0)
}

/// [`frame_len`] for a buffer whose first `scanned` bytes are already known
/// to hold no sentinel
pub(crate) fn frame_len_after(data: &[u8], scanned: usize) -> Result<usize, ProtocolError> {
    let Some(&first) = data.first() else {
        return Err(ProtocolError::Incomplete {
            needed: 1,
            available: 0,
        });
    };

    match first {
        ACK_SENTINEL => {
            if data.len() < ACK_LEN {
                return Err(ProtocolError::Incomplete {
                    needed: ACK_LEN,
                    available: data.len(),
                });
            }
            if data[1] != ACK_TRAILER {
                return Err(ProtocolError::MalformedAck { found: data[1] });
            }
            Ok(ACK_LEN)
        }
        DATA_SENTINEL => {
            if data.len() < DATA_OVERHEAD {
                return Err(ProtocolError::Incomplete {
                    needed: DATA_OVERHEAD,
                    available: data.len(),
                });
            }
            let needed = DATA_OVERHEAD + BigEndian::read_u16(&data[1..3]) as usize;
            if data.len() < needed {
                return Err(ProtocolError::Incomplete {
                    needed,
                    available: data.len(),
                });
            }
            Ok(needed)
        }
        // The run is only known to be complete once the next sentinel is seen
        _ => {
            let start = scanned.clamp(1, data.len());
            data[start..]
                .iter()
                .position(|&b| is_sentinel(b))
                .map(|pos| start + pos)
                .ok_or(ProtocolError::UnterminatedGarbage { len: data.len() })
        }
    }
}

/// Display adapter returned by [`Frame::dump`]
pub struct FrameDump<'a> {
    frame: &'a Frame,
    prefix: &'a str,
}

impl FrameDump<'_> {
    fn write_payload(&self, f: &mut fmt::Formatter<'_>, payload: &Payload) -> fmt::Result {
        if payload.is_empty() {
            return Ok(());
        }
        let prefix = format!("{} ", self.prefix);
        write!(f, "\n{}", hex_dump_with_prefix(payload, &prefix, 0))
    }
}

impl fmt::Display for FrameDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.prefix;
        match self.frame {
            Frame::Ack => write!(f, "{prefix}ACK"),
            Frame::Data { payload, checksum } => {
                write!(f, "{prefix}PKT: len={}, chk={:02x}", payload.len(), checksum)?;
                match self.frame.checksum_status() {
                    Some(ChecksumStatus::Mismatch { computed, .. }) => {
                        write!(f, " (ERR: {computed:02X})")?
                    }
                    _ => write!(f, " (OK)")?,
                }
                self.write_payload(f, payload)
            }
            Frame::Unknown { bytes } => {
                write!(f, "{prefix}UKN: len={}", bytes.len())?;
                self.write_payload(f, bytes)
            }
        }
    }
}
