//! Sliding-window activity gate for quiet mode.
//!
//! Every inbound channel message is recorded here. When the number of arrivals
//! inside the trailing window reaches the threshold the bot stops auto-replying
//! until enough of them age out.

use log::debug;
use std::collections::VecDeque;

/// Arrival timestamps (ms since boot) inside the trailing window, oldest first.
#[derive(Debug, Clone)]
pub struct TimeWindowGate {
    window: VecDeque<u64>,
    span_ms: u64,
    capacity: usize,
    threshold: usize,
    quiet: bool,
}

impl TimeWindowGate {
    pub fn new(span_ms: u64, capacity: usize, threshold: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            span_ms,
            capacity,
            threshold,
            quiet: false,
        }
    }

    /// Record an arrival at `now` and report whether the channel is too busy to reply.
    ///
    /// Entries older than the span are dropped first; if the window is still full
    /// the new arrival is not kept. An entry stamped after `now` (clock regression)
    /// counts as fresh.
    pub fn record_and_check(&mut self, now: u64) -> bool {
        let span = self.span_ms;
        self.window.retain(|&t| now.saturating_sub(t) < span);

        if self.window.len() < self.capacity {
            self.window.push_back(now);
        }

        let quiet = self.window.len() >= self.threshold;
        if quiet != self.quiet {
            debug!(
                "Quiet mode {} ({} messages in window)",
                if quiet { "on" } else { "off" },
                self.window.len()
            );
        }
        self.quiet = quiet;
        quiet
    }

    /// Force quiet mode until the next recorded arrival recomputes it.
    pub fn force_quiet(&mut self) {
        self.quiet = true;
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Arrivals currently held in the window.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPAN: u64 = 5 * 60 * 1000;

    #[test]
    fn quiet_at_threshold() {
        let mut gate = TimeWindowGate::new(SPAN, 255, 20);
        for i in 0..19 {
            assert!(!gate.record_and_check(i * 1000), "arrival {} too early", i);
        }
        assert!(gate.record_and_check(19_000));
        assert_eq!(gate.len(), 20);
    }

    #[test]
    fn entries_age_out_at_span() {
        let mut gate = TimeWindowGate::new(SPAN, 255, 3);
        gate.record_and_check(0);
        gate.record_and_check(1);
        assert!(gate.record_and_check(2));
        // exactly one span after the first arrival: it no longer counts
        assert!(gate.record_and_check(SPAN));
        assert_eq!(gate.len(), 3);
        assert!(!gate.record_and_check(SPAN + 3));
        assert_eq!(gate.len(), 2);
    }

    #[test]
    fn saturates_at_capacity() {
        let mut gate = TimeWindowGate::new(SPAN, 4, 4);
        for t in 0..10 {
            gate.record_and_check(t);
        }
        assert_eq!(gate.len(), 4);
        assert!(gate.is_quiet());
    }

    #[test]
    fn clock_regression_keeps_entries() {
        let mut gate = TimeWindowGate::new(SPAN, 255, 3);
        gate.record_and_check(1_000_000);
        gate.record_and_check(1_000_001);
        // the clock jumped backwards; earlier entries look like the future
        assert!(gate.record_and_check(10));
        assert_eq!(gate.len(), 3);
    }

    #[test]
    fn forced_quiet_lasts_until_next_arrival() {
        let mut gate = TimeWindowGate::new(SPAN, 255, 20);
        gate.force_quiet();
        assert!(gate.is_quiet());
        assert!(!gate.record_and_check(0));
        assert!(!gate.is_quiet());
    }
}
