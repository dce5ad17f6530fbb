//! Raw and frame dumps

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::io::Write;

use cotre_core::capture::{Chunk, Direction, Timestamp};
use cotre_core::hexdump::hex_dump_with_prefix;
use cotre_core::prelude::*;
use cotre_core::session::Tail;

/// What to extract from a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Dump the raw data of every USB transfer
    Raw,
    /// Reassemble both directions and dump the frame structure
    #[value(alias = "packet", alias = "frames")]
    Packets,
}

fn timestamp_line(
    out: &mut impl Write,
    config: &DecoderConfig,
    direction: Direction,
    timestamp: Option<&Timestamp>,
) -> Result<()> {
    if let (true, Some(ts)) = (config.show_timestamps, timestamp) {
        writeln!(
            out,
            "{} @ {}",
            config.marker(direction),
            ts.format("%Y-%m-%d %H:%M:%S%.6f")
        )?;
    }
    Ok(())
}

/// Print every chunk as a hex dump, returns the number of chunks
pub fn dump_raw<I, W>(source: I, config: &DecoderConfig, out: &mut W) -> Result<usize>
where
    I: IntoIterator<Item = Result<Chunk, CaptureError>>,
    W: Write,
{
    let mut count = 0;
    for chunk in source {
        let chunk = chunk.context("Failed to read capture")?;
        timestamp_line(out, config, chunk.direction, chunk.timestamp.as_ref())?;

        let prefix = format!("{} ", config.marker(chunk.direction));
        if chunk.data.is_empty() {
            writeln!(out, "{prefix}(empty)")?;
        } else {
            writeln!(out, "{}", hex_dump_with_prefix(&chunk.data, &prefix, 0))?;
        }
        count += 1;
    }
    Ok(count)
}

/// Decode both directions and print every frame, then any leftover bytes
pub fn dump_frames<I, W>(source: I, config: &DecoderConfig, out: &mut W) -> Result<SessionSummary>
where
    I: IntoIterator<Item = Result<Chunk, CaptureError>>,
    W: Write,
{
    let mut decode = Session::with_config(config).decode(source);

    for decoded in decode.by_ref() {
        let decoded = decoded.context("Failed to read capture")?;
        timestamp_line(out, config, decoded.direction, decoded.timestamp.as_ref())?;

        let prefix = format!("{} ", config.marker(decoded.direction));
        writeln!(out, "{}", decoded.frame.dump(&prefix))?;
    }

    let summary = decode.finish();
    if config.report_tail {
        for tail in &summary.tails {
            write_tail(out, config, tail)?;
        }
    }
    Ok(summary)
}

fn write_tail(out: &mut impl Write, config: &DecoderConfig, tail: &Tail) -> Result<()> {
    let prefix = format!("{} ", config.marker(tail.direction));
    writeln!(out, "{prefix}EOF: {} bytes without complete frame", tail.bytes.len())?;
    writeln!(
        out,
        "{}",
        hex_dump_with_prefix(&tail.bytes, &format!("{prefix} "), 0)
    )?;
    Ok(())
}
