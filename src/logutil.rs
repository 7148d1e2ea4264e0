//! Logging helpers so mesh text, console lines and peer names stay on one log line,
//! plus the compact hex rendering used for routing paths.

use std::fmt::Write;

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
///   Other control characters become `\xNN`. Long strings are cut with an ellipsis.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 200; // a full inbound body plus some slack
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Render a relay path as upper-case hex bytes joined by commas (`0A,0B`).
/// An empty path renders as an empty string.
pub fn format_path(path: &[u8]) -> String {
    let mut out = String::with_capacity(path.len() * 3);
    for (i, hop) in path.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(&mut out, "{:02X}", hop);
    }
    out
}

/// Short hex prefix of a public key for log lines (first 4 bytes).
pub fn key_prefix(key: &[u8]) -> String {
    key.iter().take(4).fold(String::new(), |mut acc, b| {
        let _ = write!(&mut acc, "{:02x}", b);
        acc
    })
}
