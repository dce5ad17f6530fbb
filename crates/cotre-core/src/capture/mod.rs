//! Capture Sources
//!
//! Turns recorded traffic into direction-tagged byte chunks that can be fed
//! into a [`Session`](crate::session::Session).
//!
//! Supported inputs:
//! - libpcap files with USB link types (USBPcap, Linux usbmon)
//! - JSON chunk logs, one chunk per line

pub mod chunk_log;
mod error;
pub mod pcap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

pub use chunk_log::{ChunkLogReader, ChunkLogWriter};
pub use error::CaptureError;
pub use pcap::{LinkType, PcapReader};

/// Capture time of a chunk
pub type Timestamp = DateTime<Utc>;

/// Transmission direction of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Sent by the host (PC) to the device
    HostToDevice,
    /// Sent by the device to the host
    DeviceToHost,
}

impl Direction {
    /// Both directions, host first
    pub const ALL: [Direction; 2] = [Direction::HostToDevice, Direction::DeviceToHost];

    /// Default marker used when dumping this direction
    pub fn marker(&self) -> &'static str {
        match self {
            Direction::HostToDevice => ">",
            Direction::DeviceToHost => "<",
        }
    }
}

/// A run of bytes captured in one direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Direction the bytes travelled in
    pub direction: Direction,
    /// Capture time, if the source records one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Raw bytes
    #[serde(with = "chunk_log::hex_bytes")]
    pub data: Vec<u8>,
}

impl Chunk {
    /// Create a chunk without a timestamp
    pub fn new(direction: Direction, data: impl Into<Vec<u8>>) -> Self {
        Self {
            direction,
            timestamp: None,
            data: data.into(),
        }
    }

    /// Attach a capture timestamp
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Any source of chunks, in capture order
pub type CaptureSource = Box<dyn Iterator<Item = Result<Chunk, CaptureError>>>;

/// Supported capture file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureFormat {
    /// Detect from file extension, then from content
    #[default]
    Auto,
    /// libpcap file with a USB link type
    Pcap,
    /// JSON chunk log
    ChunkLog,
}

impl CaptureFormat {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "pcap" | "cap" => Some(CaptureFormat::Pcap),
            "jsonl" | "ndjson" => Some(CaptureFormat::ChunkLog),
            _ => None,
        }
    }

    /// Detect format from the first bytes of a file
    pub fn from_content(head: &[u8]) -> Option<Self> {
        if head.len() >= 4 && pcap::is_pcap_magic(&head[..4]) {
            return Some(CaptureFormat::Pcap);
        }
        match head.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') | Some(b'#') => Some(CaptureFormat::ChunkLog),
            _ => None,
        }
    }
}

/// Open a capture file as a chunk source
pub fn open_capture<P: AsRef<Path>>(
    path: P,
    format: CaptureFormat,
) -> Result<CaptureSource, CaptureError> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);

    let format = match format {
        CaptureFormat::Auto => match CaptureFormat::from_extension(path) {
            Some(format) => format,
            None => CaptureFormat::from_content(reader.fill_buf()?)
                .ok_or_else(|| CaptureError::UnknownFormat(path.display().to_string()))?,
        },
        format => format,
    };
    debug!("capture: opening {} as {:?}", path.display(), format);

    let source: CaptureSource = match format {
        CaptureFormat::Pcap => Box::new(PcapReader::new(reader)?),
        _ => Box::new(ChunkLogReader::new(reader)),
    };
    Ok(source)
}
