//! Reply engine: turns one inbound channel message into zero or one reply.
//!
//! The engine owns all per-session state the reply path touches: the activity
//! window, the relay table, the counters, the clock-set latch and the cooldown
//! timestamp. It never talks to the transport itself. [`ReplyEngine::on_message`]
//! returns a [`ReplyOutcome`]; the server performs the pre-send pause and the send
//! and reports success back through [`ReplyEngine::record_sent`].
use log::{debug, info, warn};

use super::gate::TimeWindowGate;
use super::relays::RelayStatsTracker;
use super::triggers::{hop_word, parse_channel_text, Trigger, TriggerMatcher};
use crate::config::ReplyConfig;
use crate::logutil::{escape_log, format_path};
use crate::mesh::{ChannelMessage, Clock};
use crate::metrics::{Counters, Snapshot};
use crate::validation::clamp_utf8;

/// What to do with an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    /// No trigger matched (or the text did not parse).
    Silent,
    /// Reply text to send on the channel.
    Send(String),
    /// A reply was produced but withheld.
    Suppressed { text: String, reason: SuppressReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    Quiet,
    Cooldown,
}

/// Result of a forward-only clock update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockUpdate {
    Set(u32),
    /// Requested value was not ahead of the current clock, which is kept.
    Rejected { current: u32 },
}

pub struct ReplyEngine {
    settings: ReplyConfig,
    matcher: TriggerMatcher,
    gate: TimeWindowGate,
    relays: RelayStatsTracker,
    counters: Counters,
    boot_ms: u64,
    clock_set: bool,
    session_start: Option<u32>,
    clock_update: Option<ClockUpdate>,
    last_sent: Option<u64>,
    last_received: Option<u64>,
}

impl ReplyEngine {
    /// `mention` is the plain bot name addressed commands must contain.
    pub fn new(settings: &ReplyConfig, mention: &str, boot_ms: u64) -> Self {
        Self {
            matcher: TriggerMatcher::new(mention, settings.enable_stats),
            gate: TimeWindowGate::new(
                settings.window_span_ms(),
                settings.quiet_window_capacity,
                settings.quiet_threshold,
            ),
            relays: RelayStatsTracker::new(),
            counters: Counters::new(),
            boot_ms,
            clock_set: false,
            session_start: None,
            clock_update: None,
            last_sent: None,
            last_received: None,
            settings: settings.clone(),
        }
    }

    pub fn relays(&self) -> &RelayStatsTracker {
        &self.relays
    }

    pub fn relays_mut(&mut self) -> &mut RelayStatsTracker {
        &mut self.relays
    }

    pub fn counters(&self) -> Snapshot {
        self.counters.snapshot()
    }

    pub fn is_quiet(&self) -> bool {
        self.gate.is_quiet()
    }

    pub fn window_len(&self) -> usize {
        self.gate.len()
    }

    pub fn last_received(&self) -> Option<u64> {
        self.last_received
    }

    pub fn session_start(&self) -> Option<u32> {
        self.session_start
    }

    /// Operator override: stay quiet until the next inbound message recomputes it.
    pub fn force_quiet(&mut self) {
        self.gate.force_quiet();
    }

    /// Result of the clock update the last inbound message latched, if any.
    /// Cleared by the call.
    pub fn take_clock_update(&mut self) -> Option<ClockUpdate> {
        self.clock_update.take()
    }

    /// Process one inbound channel message.
    pub fn on_message(&mut self, clock: &mut dyn Clock, msg: &ChannelMessage) -> ReplyOutcome {
        if !self.clock_set && msg.timestamp != 0 {
            let update = self.set_clock(clock, msg.timestamp.saturating_add(1));
            self.clock_update = Some(update);
        }

        let now = clock.now_millis();
        self.counters.inc_received();
        self.last_received = Some(now);
        let quiet = self.gate.record_and_check(now);

        let Some(parsed) = parse_channel_text(&msg.text) else {
            debug!("Unparsed channel text: {}", escape_log(&msg.text));
            return ReplyOutcome::Silent;
        };

        let mut parts = Vec::new();
        for trigger in self.matcher.matches(parsed.body) {
            let line = match trigger {
                Trigger::Ping => self.ping_reply(parsed.sender, msg),
                Trigger::Stats => self.stats_reply(parsed.sender, clock),
                Trigger::Thanks => {
                    let n = self.counters.inc_thanks();
                    format!("@[{}] всегда пожалуйста! (спасибо №{})", parsed.sender, n)
                }
                Trigger::Weather => format!(
                    "@[{}] погода отличная: 100% вероятность радиоволн",
                    parsed.sender
                ),
                Trigger::Repeaters => self.repeaters_reply(parsed.sender),
            };
            parts.push(line);
        }
        if parts.is_empty() {
            return ReplyOutcome::Silent;
        }

        let text = parts.join("\n");
        self.counters.inc_requests();

        let reason = if quiet {
            Some(SuppressReason::Quiet)
        } else if !self.cooldown_elapsed(now) {
            Some(SuppressReason::Cooldown)
        } else {
            None
        };
        match reason {
            None => ReplyOutcome::Send(text),
            Some(reason) => {
                self.counters.inc_ignored();
                info!("Quiet please! ({:?}) withheld: {}", reason, escape_log(&text));
                ReplyOutcome::Suppressed { text, reason }
            }
        }
    }

    fn cooldown_elapsed(&self, now: u64) -> bool {
        match self.last_sent {
            None => true,
            Some(last) => now.saturating_sub(last) > self.settings.cooldown_ms(),
        }
    }

    /// Record a reply the transport accepted.
    pub fn record_sent(&mut self, now: u64) {
        self.last_sent = Some(now);
        self.counters.inc_sent();
    }

    /// Forward-only clock update. Either way the clock-set latch closes and the
    /// session start is fixed on first use.
    pub fn set_clock(&mut self, clock: &mut dyn Clock, secs: u32) -> ClockUpdate {
        let current = clock.epoch_seconds();
        let update = if secs > current {
            clock.set_epoch_seconds(secs);
            info!("Clock set to {}", secs);
            ClockUpdate::Set(secs)
        } else {
            warn!("Clock cannot go backwards ({} <= {})", secs, current);
            ClockUpdate::Rejected { current }
        };
        self.clock_set = true;
        if self.session_start.is_none() {
            self.session_start = Some(clock.epoch_seconds());
        }
        update
    }

    /// Seconds since the session start, or since boot while the clock is unset.
    pub fn uptime_secs(&self, clock: &dyn Clock) -> u64 {
        match self.session_start {
            Some(start) => u64::from(clock.epoch_seconds().saturating_sub(start)),
            None => clock.now_millis().saturating_sub(self.boot_ms) / 1000,
        }
    }

    fn ping_reply(&mut self, sender: &str, msg: &ChannelMessage) -> String {
        if msg.is_direct() {
            return format!("@[{}] директ c SNR {:.2} dB", sender, msg.snr);
        }
        let hops = msg.path.len();
        let mut line = format!(
            "@[{}] {} {}: {}",
            sender,
            hops,
            hop_word(hops),
            format_path(&msg.path)
        );
        if self.settings.enable_stats {
            self.relays.record_path(&msg.path);
            let first = msg.path[0];
            line.push_str(&format!(" (первый: {})", self.relays.name(first)));
        }
        line
    }

    fn stats_reply(&self, sender: &str, clock: &dyn Clock) -> String {
        let s = self.counters.snapshot();
        format!(
            "@[{}] up {} rx {} req {} tx {} skip {} relays {}",
            sender,
            format_uptime(self.uptime_secs(clock)),
            s.received,
            s.requests,
            s.sent,
            s.ignored_quiet,
            self.relays.distinct_active_count()
        )
    }

    fn repeaters_reply(&self, sender: &str) -> String {
        let top = self.relays.top3();
        if top.len() < 3 {
            return format!("@[{}] мало данных для топа ретрансляторов", sender);
        }
        let ranked: Vec<String> = top
            .iter()
            .map(|r| format!("{:02X} {} {}", r.id, r.name, r.first_hop_count))
            .collect();
        format!("@[{}] топ: {}", sender, ranked.join(", "))
    }

    /// Multi-line status used by the console `stats` command.
    pub fn stats_lines(&self, clock: &dyn Clock) -> Vec<String> {
        let s = self.counters.snapshot();
        vec![
            format!("uptime: {}", format_uptime(self.uptime_secs(clock))),
            format!("received: {}", s.received),
            format!("requests: {}", s.requests),
            format!("sent: {}", s.sent),
            format!("ignored: {}", s.ignored_quiet),
            format!("thanks: {}", s.thanks),
            format!(
                "window: {} (quiet: {})",
                self.gate.len(),
                if self.gate.is_quiet() { "yes" } else { "no" }
            ),
            format!("active relays: {}", self.relays.distinct_active_count()),
        ]
    }
}

/// `"<name>: <body>"` cut to `max_len` bytes on a character boundary.
pub fn outgoing_text(name: &str, body: &str, max_len: usize) -> String {
    let full = format!("{}: {}", name, body);
    clamp_utf8(&full, max_len).to_string()
}

/// `1d02h03m`, `2h05m` or `7m`.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let mins = (secs % 3600) / 60;
    if days > 0 {
        format!("{}d{:02}h{:02}m", days, hours, mins)
    } else if hours > 0 {
        format!("{}h{:02}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{ManualClock, RouteKind};

    fn msg(text: &str, path: &[u8]) -> ChannelMessage {
        ChannelMessage {
            text: text.to_string(),
            path: path.to_vec(),
            timestamp: 0,
            route: RouteKind::Flood,
            snr: 9.25,
        }
    }

    fn engine() -> ReplyEngine {
        ReplyEngine::new(&ReplyConfig::default(), "Mr.Pong", 0)
    }

    #[test]
    fn direct_ping_reports_snr() {
        let mut e = engine();
        let mut clock = ManualClock::new(1_000, 0);
        match e.on_message(&mut clock, &msg("Alice: ping", &[])) {
            ReplyOutcome::Send(text) => assert_eq!(text, "@[Alice] директ c SNR 9.25 dB"),
            other => panic!("Expected Send, got {:?}", other),
        }
    }

    #[test]
    fn relayed_ping_names_first_hop() {
        let mut e = engine();
        e.relays_mut().set_name(0x0A, "Hilltop");
        let mut clock = ManualClock::new(1_000, 0);
        match e.on_message(&mut clock, &msg("Alice: ping", &[0x0A, 0x0B])) {
            ReplyOutcome::Send(text) => {
                assert_eq!(text, "@[Alice] 2 хопа: 0A,0B (первый: Hilltop)")
            }
            other => panic!("Expected Send, got {:?}", other),
        }
        assert_eq!(e.relays().get(0x0A).first_hop_count, 1);
        assert_eq!(e.relays().get(0x0B).total_hop_count, 1);
    }

    #[test]
    fn minimal_mode_skips_relay_stats() {
        let cfg = ReplyConfig {
            enable_stats: false,
            ..ReplyConfig::default()
        };
        let mut e = ReplyEngine::new(&cfg, "Mr.Pong", 0);
        let mut clock = ManualClock::new(1_000, 0);
        match e.on_message(&mut clock, &msg("Alice: test", &[0x0A])) {
            ReplyOutcome::Send(text) => assert_eq!(text, "@[Alice] 1 хоп: 0A"),
            other => panic!("Expected Send, got {:?}", other),
        }
        assert_eq!(e.relays().distinct_active_count(), 0);
        assert_eq!(e.on_message(&mut clock, &msg("Bob: Mr.Pong stats", &[])), ReplyOutcome::Silent);
    }

    #[test]
    fn cooldown_suppresses_second_reply() {
        let mut e = engine();
        let mut clock = ManualClock::new(10_000, 0);
        assert!(matches!(e.on_message(&mut clock, &msg("A: ping", &[])), ReplyOutcome::Send(_)));
        e.record_sent(clock.now_millis());
        clock.advance(2_000);
        match e.on_message(&mut clock, &msg("B: ping", &[])) {
            ReplyOutcome::Suppressed { reason, .. } => assert_eq!(reason, SuppressReason::Cooldown),
            other => panic!("Expected Suppressed, got {:?}", other),
        }
        let s = e.counters();
        assert_eq!((s.requests, s.sent, s.ignored_quiet), (2, 1, 1));

        clock.advance(3_001);
        assert!(matches!(e.on_message(&mut clock, &msg("C: ping", &[])), ReplyOutcome::Send(_)));
    }

    #[test]
    fn forced_quiet_withholds_reply() {
        let mut e = engine();
        let mut clock = ManualClock::new(0, 0);
        e.force_quiet();
        assert!(e.is_quiet());
        // the next arrival recomputes the flag from the window
        assert!(matches!(e.on_message(&mut clock, &msg("A: ping", &[])), ReplyOutcome::Send(_)));
    }

    #[test]
    fn busy_channel_goes_quiet() {
        let mut e = engine();
        let mut clock = ManualClock::new(0, 0);
        for _ in 0..19 {
            e.on_message(&mut clock, &msg("Chatter: hello", &[]));
            clock.advance(1_000);
        }
        match e.on_message(&mut clock, &msg("A: ping", &[])) {
            ReplyOutcome::Suppressed { reason, .. } => assert_eq!(reason, SuppressReason::Quiet),
            other => panic!("Expected Suppressed, got {:?}", other),
        }
        assert_eq!(e.counters().received, 20);
    }

    #[test]
    fn addressed_replies_join_in_order() {
        let mut e = engine();
        let mut clock = ManualClock::new(0, 0);
        match e.on_message(&mut clock, &msg("Bob: Mr.Pong спасибо, погода?", &[])) {
            ReplyOutcome::Send(text) => {
                let lines: Vec<&str> = text.lines().collect();
                assert_eq!(lines.len(), 2);
                assert!(lines[0].contains("спасибо №1"));
                assert!(lines[1].contains("погода"));
            }
            other => panic!("Expected Send, got {:?}", other),
        }
    }

    #[test]
    fn repeaters_needs_three_relays() {
        let mut e = engine();
        let mut clock = ManualClock::new(0, 0);
        e.relays_mut().record_path(&[1]);
        e.relays_mut().record_path(&[2]);
        match e.on_message(&mut clock, &msg("Bob: Mr.Pong repeaters", &[])) {
            ReplyOutcome::Send(text) => assert!(text.contains("мало данных")),
            other => panic!("Expected Send, got {:?}", other),
        }
        e.relays_mut().record_path(&[3]);
        e.relays_mut().record_path(&[3]);
        clock.advance(10_000);
        e.record_sent(0);
        match e.on_message(&mut clock, &msg("Bob: Mr.Pong repeaters", &[])) {
            ReplyOutcome::Send(text) => assert_eq!(
                text,
                "@[Bob] топ: 03 UnknownRepeater 2, 01 UnknownRepeater 1, 02 UnknownRepeater 1"
            ),
            other => panic!("Expected Send, got {:?}", other),
        }
    }

    #[test]
    fn first_timestamp_sets_clock_once() {
        let mut e = engine();
        let mut clock = ManualClock::new(0, 1_000);
        let mut m = msg("A: hello", &[]);
        m.timestamp = 1_700_000_000;
        e.on_message(&mut clock, &m);
        assert_eq!(clock.epoch_seconds(), 1_700_000_001);
        assert_eq!(e.session_start(), Some(1_700_000_001));

        assert_eq!(e.take_clock_update(), Some(ClockUpdate::Set(1_700_000_001)));

        m.timestamp = 1_800_000_000;
        e.on_message(&mut clock, &m);
        assert_eq!(clock.epoch_seconds(), 1_700_000_001);
        assert_eq!(e.take_clock_update(), None);
    }

    #[test]
    fn stale_first_timestamp_is_rejected_and_reported() {
        let mut e = engine();
        let mut clock = ManualClock::new(0, 1_000);
        let mut m = msg("A: hello", &[]);
        m.timestamp = 500;
        e.on_message(&mut clock, &m);
        assert_eq!(clock.epoch_seconds(), 1_000);
        assert_eq!(e.take_clock_update(), Some(ClockUpdate::Rejected { current: 1_000 }));
        assert_eq!(e.session_start(), Some(1_000));
    }

    #[test]
    fn clock_never_goes_backwards() {
        let mut e = engine();
        let mut clock = ManualClock::new(0, 5_000);
        assert_eq!(e.set_clock(&mut clock, 4_000), ClockUpdate::Rejected { current: 5_000 });
        assert_eq!(clock.epoch_seconds(), 5_000);
        assert_eq!(e.set_clock(&mut clock, 6_000), ClockUpdate::Set(6_000));
    }

    #[test]
    fn outgoing_text_is_bounded() {
        let body = "д".repeat(200);
        let out = outgoing_text("Mr.Pong🏓", &body, 160);
        assert!(out.len() <= 160);
        assert!(out.starts_with("Mr.Pong🏓: д"));
        assert_eq!(outgoing_text("bot", "hi", 160), "bot: hi");
    }

    #[test]
    fn uptime_formats() {
        assert_eq!(format_uptime(59), "0m");
        assert_eq!(format_uptime(3 * 3600 + 5 * 60), "3h05m");
        assert_eq!(format_uptime(86_400 + 60), "1d00h01m");
    }
}
