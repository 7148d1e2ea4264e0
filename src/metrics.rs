//! Reply counters owned by the reply engine.
//!
//! Counters only ever grow within a session; a console `reboot` replaces the whole
//! struct with a fresh default.

#[derive(Debug, Default, Clone)]
pub struct Counters {
    received: u64,
    requests: u64,
    sent: u64,
    ignored_quiet: u64,
    thanks: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every inbound channel message, parsed or not.
    pub fn inc_received(&mut self) {
        self.received = self.received.saturating_add(1);
    }

    /// Inbound messages that produced reply text.
    pub fn inc_requests(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    pub fn inc_sent(&mut self) {
        self.sent = self.sent.saturating_add(1);
    }

    /// Replies withheld by quiet mode or the cooldown.
    pub fn inc_ignored(&mut self) {
        self.ignored_quiet = self.ignored_quiet.saturating_add(1);
    }

    /// Returns the new total so the reply can quote it.
    pub fn inc_thanks(&mut self) -> u64 {
        self.thanks = self.thanks.saturating_add(1);
        self.thanks
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            received: self.received,
            requests: self.requests,
            sent: self.sent,
            ignored_quiet: self.ignored_quiet,
            thanks: self.thanks,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub received: u64,
    pub requests: u64,
    pub sent: u64,
    pub ignored_quiet: u64,
    pub thanks: u64,
}
