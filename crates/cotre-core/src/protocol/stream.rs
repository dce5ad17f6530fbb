//! Stream reassembly
//!
//! Accumulates the bytes seen in one transmission direction and cuts them
//! into frames. Chunk boundaries carry no meaning: a chunk may hold several
//! frames, and a frame may span several chunks.
//!
//! Callers append every chunk and then drain with
//! `while stream.has_frame() { stream.pop_frame() }` (or [`Stream::frames`]).

use tracing::{debug, trace, warn};

use super::frame::frame_len_after;
use super::{is_sentinel, Frame, ProtocolError, ACK_SENTINEL};

/// Consumed bytes are only compacted away once at least this many piled up
const COMPACT_THRESHOLD: usize = 4096;

/// Reassembly state of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Nothing buffered
    Empty,
    /// Bytes buffered, but not a complete frame
    Partial,
    /// A complete frame is at the head of the buffer
    Ready,
}

/// Byte buffer for one transmission direction
#[derive(Debug, Default, Clone)]
pub struct Stream {
    /// Buffered bytes, `buffer[..head]` is already consumed
    buffer: Vec<u8>,
    head: usize,
    /// Length of the sentinel-free run at the head, 0 when the head is a sentinel
    scanned: usize,
}

impl Stream {
    /// Create an empty stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of received bytes
    pub fn append(&mut self, chunk: &[u8]) {
        self.compact();
        self.buffer.extend_from_slice(chunk);
        self.scan();
        trace!(
            appended = chunk.len(),
            buffered = self.len(),
            "stream: appended chunk"
        );
    }

    /// Bytes buffered but not yet consumed
    pub fn pending(&self) -> &[u8] {
        &self.buffer[self.head..]
    }

    /// Number of bytes buffered but not yet consumed
    pub fn len(&self) -> usize {
        self.buffer.len() - self.head
    }

    /// Check if no bytes are buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether a complete frame is at the head of the buffer
    pub fn has_frame(&self) -> bool {
        self.head_len().is_ok()
    }

    fn head_len(&self) -> Result<usize, ProtocolError> {
        frame_len_after(self.pending(), self.scanned)
    }

    /// Current reassembly state
    pub fn state(&self) -> StreamState {
        if self.is_empty() {
            StreamState::Empty
        } else if self.has_frame() {
            StreamState::Ready
        } else {
            StreamState::Partial
        }
    }

    /// Remove and return the frame at the head of the buffer
    ///
    /// Fails with [`ProtocolError::NoFrameAvailable`] when [`Stream::has_frame`]
    /// is false; the buffer is left untouched in that case.
    pub fn pop_frame(&mut self) -> Result<Frame, ProtocolError> {
        let len = match self.head_len() {
            Ok(len) => len,
            Err(e) => {
                debug!("stream: pop_frame without a complete frame ({e})");
                return Err(ProtocolError::NoFrameAvailable);
            }
        };
        // An unknown run is only recognized together with its terminating sentinel
        let pending = self.pending();
        let frame = Frame::decode(&pending[..(len + 1).min(pending.len())])
            .map_err(|_| ProtocolError::NoFrameAvailable)?;

        self.consume(frame.wire_len());
        trace!(
            kind = ?frame.kind(),
            len = frame.wire_len(),
            remaining = self.len(),
            "stream: extracted frame"
        );
        Ok(frame)
    }

    /// Drain every complete frame currently buffered
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { stream: self }
    }

    /// Check whether the head can never become a frame
    ///
    /// This is the case for an ACK sentinel followed by anything other than
    /// the ACK trailer byte. Appending more data does not help; only
    /// [`Stream::resync`] moves the stream forward again.
    pub fn is_stalled(&self) -> bool {
        matches!(
            self.head_len(),
            Err(ProtocolError::MalformedAck { .. })
        )
    }

    /// Skip the sentinel byte of a stalled stream
    ///
    /// Returns the skipped byte as an unknown frame, or `None` if the stream
    /// is not stalled.
    pub fn resync(&mut self) -> Option<Frame> {
        if !self.is_stalled() {
            return None;
        }
        warn!(
            "stream: stray {:#04x} {:#04x}, skipping sentinel byte",
            ACK_SENTINEL,
            self.pending()[1]
        );
        self.consume(1);
        Some(Frame::unknown([ACK_SENTINEL]))
    }

    /// Take every byte still buffered, leaving the stream empty
    pub fn take_remaining(&mut self) -> Vec<u8> {
        let remaining = self.pending().to_vec();
        self.clear();
        remaining
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.head = 0;
        self.scanned = 0;
    }

    fn consume(&mut self, n: usize) {
        self.head += n;
        self.scanned = 0;
        if self.head >= self.buffer.len() {
            self.clear();
        } else {
            self.scan();
        }
    }

    /// Extend the sentinel-free run at the head over newly buffered bytes
    fn scan(&mut self) {
        let pending = &self.buffer[self.head..];
        if pending.first().map_or(true, |&b| is_sentinel(b)) {
            self.scanned = 0;
            return;
        }
        self.scanned += pending[self.scanned..]
            .iter()
            .take_while(|&&b| !is_sentinel(b))
            .count();
    }

    fn compact(&mut self) {
        if self.head >= COMPACT_THRESHOLD && self.head * 2 >= self.buffer.len() {
            self.buffer.drain(..self.head);
            self.head = 0;
        }
    }
}

/// Iterator returned by [`Stream::frames`]
pub struct Frames<'a> {
    stream: &'a mut Stream,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.stream.has_frame() {
            self.stream.pop_frame().ok()
        } else {
            None
        }
    }
}
