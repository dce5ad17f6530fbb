//! JSON chunk logs
//!
//! One chunk per line:
//!
//! ```text
//! {"direction":"host_to_device","data":"ad0002aabb11"}
//! {"direction":"device_to_host","timestamp":"2024-05-01T12:00:00Z","data":"1311"}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use std::io::{self, BufRead, Write};

use super::{CaptureError, Chunk};

/// Reads chunks from a JSON chunk log
pub struct ChunkLogReader<R> {
    lines: io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> ChunkLogReader<R> {
    /// Create a reader over buffered input
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for ChunkLogReader<R> {
    type Item = Result<Chunk, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            return Some(
                serde_json::from_str(line).map_err(|e| CaptureError::InvalidRecord {
                    line: self.line_no,
                    message: e.to_string(),
                }),
            );
        }
    }
}

/// Writes chunks as a JSON chunk log
pub struct ChunkLogWriter<W: Write> {
    writer: W,
}

impl<W: Write> ChunkLogWriter<W> {
    /// Create a writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Append one chunk
    pub fn write(&mut self, chunk: &Chunk) -> Result<(), CaptureError> {
        serde_json::to_writer(&mut self.writer, chunk)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Flush and return the underlying writer
    pub fn finish(mut self) -> Result<W, CaptureError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Serde helpers storing bytes as a lowercase hex string
pub mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serialize bytes as hex
    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(data))
    }

    /// Deserialize bytes from hex, whitespace between digit pairs is allowed
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        decode(&text).map_err(de::Error::custom)
    }

    /// Parse a hex string into bytes, ignoring ASCII whitespace
    pub fn decode(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
        let digits: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        hex::decode(digits)
    }
}
