//! Capture errors

use thiserror::Error;

/// Errors that can occur while reading capture files
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not a pcap file: bad magic {0:#010x}")]
    BadMagic(u32),

    #[error("Unsupported pcap link type {0}, expected a USB capture")]
    UnsupportedLinkType(u32),

    #[error("Truncated capture: {0}")]
    Truncated(String),

    #[error("Invalid chunk log line {line}: {message}")]
    InvalidRecord { line: usize, message: String },

    #[error("Cannot detect capture format of {0}")]
    UnknownFormat(String),
}
