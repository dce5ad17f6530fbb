//! Hex dump formatting
//!
//! Renders bytes as an address-annotated table, 16 bytes per line:
//!
//! ```text
//! 00000000 48 65 6c 6c 6f 00                               | Hello.
//! ```

use std::fmt::Write;

/// Bytes shown on each line
pub const BYTES_PER_LINE: usize = 16;

/// Format `data` as a hex dump starting at address `addr`
pub fn hex_dump(data: &[u8], addr: u32) -> String {
    hex_dump_with_prefix(data, "", addr)
}

/// Format `data` as a hex dump, every line starting with `prefix`
///
/// Lines are separated by `\n` without a trailing newline. Empty input
/// produces an empty string.
pub fn hex_dump_with_prefix(data: &[u8], prefix: &str, addr: u32) -> String {
    let mut out = String::new();

    for (line, bytes) in data.chunks(BYTES_PER_LINE).enumerate() {
        if line > 0 {
            out.push('\n');
        }
        let line_addr = addr.wrapping_add((line * BYTES_PER_LINE) as u32);
        // Writing into a String cannot fail
        let _ = write!(out, "{prefix}{line_addr:08X} ");

        for (i, b) in bytes.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{b:02x}");
        }
        for _ in bytes.len()..BYTES_PER_LINE {
            out.push_str("   ");
        }

        out.push_str(" | ");
        out.extend(bytes.iter().map(|&b| printable(b)));
    }

    out
}

/// ASCII rendering of a byte, `.` for anything outside 0x20..=0x7E
fn printable(b: u8) -> char {
    if (0x20..=0x7E).contains(&b) {
        b as char
    } else {
        '.'
    }
}
