//! Capture Sessions
//!
//! A session owns one [`Stream`] per direction and routes every captured
//! chunk into the stream of its direction. Frames come out in arrival order
//! per direction; the two directions never influence each other.

use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::capture::{CaptureError, Chunk, Direction, Timestamp};
use crate::config::DecoderConfig;
use crate::protocol::{ChecksumStatus, Frame, Stream};

/// A frame together with where and when it was seen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Direction of the stream the frame came from
    pub direction: Direction,
    /// Timestamp of the chunk that completed the frame
    pub timestamp: Option<Timestamp>,
    /// The frame
    pub frame: Frame,
}

/// Counters for one direction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Chunks appended
    pub chunks: usize,
    /// Bytes appended
    pub bytes: usize,
    /// ACK frames
    pub acks: usize,
    /// Data frames
    pub data_frames: usize,
    /// Data frames whose checksum did not match
    pub checksum_mismatches: usize,
    /// Unknown runs
    pub unknown_frames: usize,
    /// Bytes in unknown runs
    pub unknown_bytes: usize,
    /// Stray sentinels skipped to unstall the stream
    pub resyncs: usize,
}

impl FrameStats {
    fn record(&mut self, frame: &Frame) {
        match frame {
            Frame::Ack => self.acks += 1,
            Frame::Data { .. } => {
                self.data_frames += 1;
                if let Some(ChecksumStatus::Mismatch { .. }) = frame.checksum_status() {
                    self.checksum_mismatches += 1;
                }
            }
            Frame::Unknown { bytes } => {
                self.unknown_frames += 1;
                self.unknown_bytes += bytes.len();
            }
        }
    }

    /// Total frames of any kind
    pub fn frames(&self) -> usize {
        self.acks + self.data_frames + self.unknown_frames
    }
}

/// Bytes that never formed a frame before the session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tail {
    /// Stream the bytes were left in
    pub direction: Direction,
    /// The leftover bytes
    pub bytes: Vec<u8>,
}

/// Result of a finished session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Counters for host-originated traffic
    pub host: FrameStats,
    /// Counters for device-originated traffic
    pub device: FrameStats,
    /// Leftover bytes, at most one per direction
    pub tails: Vec<Tail>,
}

impl SessionSummary {
    /// Counters for a direction
    pub fn stats(&self, direction: Direction) -> &FrameStats {
        match direction {
            Direction::HostToDevice => &self.host,
            Direction::DeviceToHost => &self.device,
        }
    }
}

/// Host and device streams of one capture
#[derive(Debug, Default)]
pub struct Session {
    host: Stream,
    device: Stream,
    host_stats: FrameStats,
    device_stats: FrameStats,
    resync_stalled: bool,
}

impl Session {
    /// Create a session with default settings
    pub fn new() -> Self {
        Self::with_config(&DecoderConfig::default())
    }

    /// Create a session using the decoding settings of `config`
    pub fn with_config(config: &DecoderConfig) -> Self {
        Self {
            resync_stalled: config.resync_stalled,
            ..Default::default()
        }
    }

    /// Stream of a direction
    pub fn stream(&self, direction: Direction) -> &Stream {
        match direction {
            Direction::HostToDevice => &self.host,
            Direction::DeviceToHost => &self.device,
        }
    }

    /// Counters of a direction so far
    pub fn stats(&self, direction: Direction) -> &FrameStats {
        match direction {
            Direction::HostToDevice => &self.host_stats,
            Direction::DeviceToHost => &self.device_stats,
        }
    }

    fn parts_mut(&mut self, direction: Direction) -> (&mut Stream, &mut FrameStats) {
        match direction {
            Direction::HostToDevice => (&mut self.host, &mut self.host_stats),
            Direction::DeviceToHost => (&mut self.device, &mut self.device_stats),
        }
    }

    /// Append a chunk and return every frame it completed
    pub fn push(&mut self, chunk: &Chunk) -> Vec<DecodedFrame> {
        let resync_stalled = self.resync_stalled;
        let (stream, stats) = self.parts_mut(chunk.direction);

        stream.append(&chunk.data);
        stats.chunks += 1;
        stats.bytes += chunk.data.len();

        let mut frames = Vec::new();
        loop {
            for frame in stream.frames() {
                stats.record(&frame);
                if let Some(ChecksumStatus::Mismatch { stored, computed }) =
                    frame.checksum_status()
                {
                    warn!(
                        "session: {:?} checksum mismatch: stored {:02x}, computed {:02x}",
                        chunk.direction, stored, computed
                    );
                }
                frames.push(DecodedFrame {
                    direction: chunk.direction,
                    timestamp: chunk.timestamp,
                    frame,
                });
            }

            if !resync_stalled {
                break;
            }
            match stream.resync() {
                Some(frame) => {
                    stats.resyncs += 1;
                    stats.record(&frame);
                    frames.push(DecodedFrame {
                        direction: chunk.direction,
                        timestamp: chunk.timestamp,
                        frame,
                    });
                }
                None => break,
            }
        }
        frames
    }

    /// Decode a whole chunk source lazily
    pub fn decode<I>(self, source: I) -> Decode<I::IntoIter>
    where
        I: IntoIterator<Item = Result<Chunk, CaptureError>>,
    {
        Decode {
            session: self,
            source: source.into_iter(),
            pending: VecDeque::new(),
        }
    }

    /// End the session, collecting counters and leftover bytes
    pub fn finish(mut self) -> SessionSummary {
        let mut tails = Vec::new();
        for direction in Direction::ALL {
            let (stream, _) = self.parts_mut(direction);
            let bytes = stream.take_remaining();
            if !bytes.is_empty() {
                warn!(
                    "session: {:?} stream ended with {} undecoded bytes",
                    direction,
                    bytes.len()
                );
                tails.push(Tail { direction, bytes });
            }
        }
        debug!(
            "session: finished, {} host frames, {} device frames",
            self.host_stats.frames(),
            self.device_stats.frames()
        );

        SessionSummary {
            host: self.host_stats,
            device: self.device_stats,
            tails,
        }
    }
}

/// Lazy frame iterator returned by [`Session::decode`]
pub struct Decode<I> {
    session: Session,
    source: I,
    pending: VecDeque<DecodedFrame>,
}

impl<I> Decode<I> {
    /// The session being fed
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Stop decoding and finish the session
    ///
    /// Frames already decoded but not yet yielded are counted in the
    /// summary but not returned.
    pub fn finish(self) -> SessionSummary {
        self.session.finish()
    }
}

impl<I> Iterator for Decode<I>
where
    I: Iterator<Item = Result<Chunk, CaptureError>>,
{
    type Item = Result<DecodedFrame, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(Ok(frame));
            }
            match self.source.next()? {
                Ok(chunk) => self.pending.extend(self.session.push(&chunk)),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
