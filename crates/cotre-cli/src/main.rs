use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cotre_cli::{dump_frames, dump_raw, Mode};
use cotre_core::capture::{open_capture, CaptureFormat};
use cotre_core::config::DecoderConfig;

/// Capture file format as given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// Guess from extension and content
    Auto,
    /// libpcap file with a USB link type
    Pcap,
    /// JSON chunk log
    ChunkLog,
}

impl From<FormatArg> for CaptureFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Auto => CaptureFormat::Auto,
            FormatArg::Pcap => CaptureFormat::Pcap,
            FormatArg::ChunkLog => CaptureFormat::ChunkLog,
        }
    }
}

/// Dump the traffic of a cotre USB capture
#[derive(Parser, Debug)]
#[command(name = "cotre-extract", version, long_about = None)]
struct Args {
    /// What to dump
    #[arg(value_enum)]
    mode: Mode,

    /// Capture file to read
    capture: PathBuf,

    /// Capture file format
    #[arg(short, long, value_enum, default_value_t = FormatArg::Auto)]
    format: FormatArg,

    /// Decoder configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print capture timestamps
    #[arg(short, long)]
    timestamps: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match &args.config {
        Some(path) => DecoderConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DecoderConfig::default(),
    };
    config.show_timestamps |= args.timestamps;

    let source = open_capture(&args.capture, args.format.into())
        .with_context(|| format!("Failed to open capture {}", args.capture.display()))?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match args.mode {
        Mode::Raw => {
            let chunks = dump_raw(source, &config, &mut out)?;
            info!("Dumped {} chunks", chunks);
        }
        Mode::Packets => {
            let summary = dump_frames(source, &config, &mut out)?;
            for (name, stats) in [("host", &summary.host), ("device", &summary.device)] {
                info!(
                    "{}: {} chunks, {} bytes, {} acks, {} data ({} bad checksum), {} unknown",
                    name,
                    stats.chunks,
                    stats.bytes,
                    stats.acks,
                    stats.data_frames,
                    stats.checksum_mismatches,
                    stats.unknown_frames
                );
            }
        }
    }

    out.flush().context("Failed to write output")?;
    Ok(())
}
