//! # cotre command line tool
//!
//! Dumps the traffic of a capture file either as raw chunks or as decoded
//! link-layer frames. The binary lives in `main.rs`; everything that writes
//! output is here so it can be tested without spawning a process.

pub mod dump;

pub use dump::{dump_frames, dump_raw, Mode};
