//! Operator console: line assembly and command parsing.
//!
//! Console input is a raw byte stream. [`LineBuffer`] assembles it into lines and
//! [`ConsoleCommand::parse`] maps each line to a command. Unlike trigger matching,
//! an unrecognized line is reported back to the operator.
use crate::validation::parse_leading_digits;

/// Console line buffer size in bytes, terminator included.
pub const LINE_BUFFER_LEN: usize = 512 + 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Send free text on the channel.
    Public(String),
    Clock,
    /// Set the clock to epoch seconds (forward only).
    Time(u32),
    Quiet,
    Advert,
    Stats,
    Repeaters,
    Ver,
    Reboot,
    Shutdown,
    Help,
    Unknown(String),
}

impl ConsoleCommand {
    /// Parse one console line. Leading spaces are skipped; `public` and `time`
    /// take the rest of the line as their argument.
    pub fn parse(line: &str) -> Self {
        let cmd = line.trim_start_matches(' ').trim_end_matches(['\r', '\n']);

        if let Some(text) = cmd.strip_prefix("public ") {
            return ConsoleCommand::Public(text.to_string());
        }
        if let Some(arg) = cmd.strip_prefix("time ") {
            return ConsoleCommand::Time(parse_leading_digits(arg.trim_start()));
        }
        match cmd {
            "clock" => return ConsoleCommand::Clock,
            "quiet" => return ConsoleCommand::Quiet,
            "advert" => return ConsoleCommand::Advert,
            "stats" => return ConsoleCommand::Stats,
            "repeaters" => return ConsoleCommand::Repeaters,
            _ => {}
        }
        // prefix-matched, trailing text ignored
        if cmd.starts_with("ver") {
            ConsoleCommand::Ver
        } else if cmd.starts_with("reboot") {
            ConsoleCommand::Reboot
        } else if cmd.starts_with("shutdown") {
            ConsoleCommand::Shutdown
        } else if cmd.starts_with("help") {
            ConsoleCommand::Help
        } else {
            ConsoleCommand::Unknown(cmd.to_string())
        }
    }
}

/// Help text, one entry per line.
pub fn help_lines() -> Vec<String> {
    [
        "Commands:",
        "   clock",
        "   time <epoch-seconds>",
        "   advert",
        "   quiet",
        "   stats",
        "   repeaters",
        "   reboot",
        "   shutdown",
        "   ver",
        "   public <text>",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Assembles console bytes into lines.
///
/// `\r` or `\n` completes a line; empty lines are dropped. When the buffer fills
/// up without a terminator its contents are completed as a line anyway.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(LINE_BUFFER_LEN),
        }
    }

    /// Feed raw bytes, returning every line they complete.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\r' || b == b'\n' {
                self.complete(&mut lines);
                continue;
            }
            self.buf.push(b);
            if self.buf.len() == LINE_BUFFER_LEN - 1 {
                self.complete(&mut lines);
            }
        }
        lines
    }

    fn complete(&mut self, lines: &mut Vec<String>) {
        if !self.buf.is_empty() {
            lines.push(String::from_utf8_lossy(&self.buf).into_owned());
            self.buf.clear();
        }
    }

    /// Bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
