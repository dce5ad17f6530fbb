//! Decoder configuration
//!
//! Stored as JSON. Every field is optional in the file and falls back to
//! its default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::capture::Direction;

/// Settings for decoding and dumping a capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Skip stray ACK sentinels that can never complete, emitting them as unknown bytes
    pub resync_stalled: bool,
    /// Report bytes left over in each stream when the capture ends
    pub report_tail: bool,
    /// Print capture timestamps in front of frames
    pub show_timestamps: bool,
    /// Prefix for host-originated traffic
    pub host_marker: String,
    /// Prefix for device-originated traffic
    pub device_marker: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            resync_stalled: true,
            report_tail: true,
            show_timestamps: false,
            host_marker: Direction::HostToDevice.marker().to_string(),
            device_marker: Direction::DeviceToHost.marker().to_string(),
        }
    }
}

impl DecoderConfig {
    /// Load a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }

    /// Dump prefix for a direction
    pub fn marker(&self, direction: Direction) -> &str {
        match direction {
            Direction::HostToDevice => &self.host_marker,
            Direction::DeviceToHost => &self.device_marker,
        }
    }
}
