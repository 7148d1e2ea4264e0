//! Bot server: the single control loop tying the mesh seams to the reply engine,
//! the peer directory and the operator console.
//!
//! Every handler runs to completion before the loop polls again. The only
//! deliberate stall is the fixed pause in front of an auto-reply.
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use super::console::{help_lines, ConsoleCommand, LineBuffer};
use super::reply::{outgoing_text, ClockUpdate, ReplyEngine, ReplyOutcome};
use crate::config::Config;
use crate::logutil::escape_log;
use crate::mesh::{group_text_payload, AdvertScope, ChannelMessage, Clock, MeshEvent, Transport};
use crate::storage::{PeerStore, Upsert};

pub struct BotServer {
    config: Config,
    engine: ReplyEngine,
    peers: PeerStore,
    transport: Box<dyn Transport>,
    clock: Box<dyn Clock>,
    event_tx: mpsc::UnboundedSender<MeshEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<MeshEvent>>,
    line_buffer: LineBuffer,
    console_out: Vec<String>,
    last_flood_advert: u64,
    running: bool,
}

impl BotServer {
    pub fn new(
        config: Config,
        transport: Box<dyn Transport>,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let now = clock.now_millis();
        let mut server = Self {
            engine: ReplyEngine::new(&config.reply, &config.bot.plain_name(), now),
            peers: PeerStore::new(config.storage.peers_path(), config.storage.max_peers),
            transport,
            clock,
            event_tx,
            event_rx: Some(event_rx),
            line_buffer: LineBuffer::new(),
            console_out: Vec::new(),
            last_flood_advert: now,
            running: true,
            config,
        };
        server.load_peers();
        Ok(server)
    }

    /// Sender for inbound mesh events (feed readers, tests).
    pub fn event_sender(&self) -> mpsc::UnboundedSender<MeshEvent> {
        self.event_tx.clone()
    }

    pub fn engine(&self) -> &ReplyEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ReplyEngine {
        &mut self.engine
    }

    pub fn peers(&self) -> &PeerStore {
        &self.peers
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Console notices produced outside a console command (reply outcomes,
    /// storage failures), oldest first.
    pub fn drain_console(&mut self) -> Vec<String> {
        std::mem::take(&mut self.console_out)
    }

    fn persistence(&self) -> bool {
        self.config.reply.enable_persistence
    }

    fn load_peers(&mut self) {
        if !self.persistence() {
            return;
        }
        if let Err(e) = self.peers.load(self.engine.relays_mut()) {
            warn!("Relay directory load failed: {}", e);
            self.console_out
                .push(format!("   ERROR: relay directory not loaded: {}", e));
        }
    }

    fn save_peers(&mut self) {
        if !self.persistence() {
            return;
        }
        if let Err(e) = self.peers.save(self.engine.relays_mut()) {
            // no automatic retry; the next relay change schedules another save
            self.peers.clear_dirty();
            warn!("Relay directory save failed: {}", e);
            self.console_out
                .push(format!("   ERROR: relay directory not saved: {}", e));
        }
    }

    /// Run the control loop on stdin until `shutdown` or Ctrl-C.
    pub async fn run(&mut self) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stdin = tokio::io::stdin();
            let mut buf = [0u8; 256];
            loop {
                match stdin.read(&mut buf).await {
                    Ok(0) => {
                        debug!("Console input closed");
                        break;
                    }
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Console read error: {}", e);
                        break;
                    }
                }
            }
        });
        self.run_with_console(rx).await
    }

    /// Run the control loop with console bytes from `console_rx`.
    pub async fn run_with_console(
        &mut self,
        mut console_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Result<()> {
        let mut events = self
            .event_rx
            .take()
            .ok_or_else(|| anyhow!("Bot server loop is already running"))?;
        info!(
            "Bot '{}' listening on channel {} ({})",
            self.config.bot.name, self.config.bot.channel, self.config.bot.channel_name
        );

        // Periodic tick to drive housekeeping even without incoming events
        let mut periodic = tokio::time::interval(Duration::from_secs(1));
        periodic.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while self.running {
            tokio::select! {
                _ = periodic.tick() => {
                    self.tick();
                }
                Some(event) = events.recv() => {
                    self.handle_mesh_event(event).await;
                }
                Some(bytes) = console_rx.recv() => {
                    for line in self.line_buffer.push_bytes(&bytes) {
                        for out in self.handle_console_line(&line) {
                            println!("{}", out);
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    self.shutdown();
                }
            }
            for out in self.drain_console() {
                println!("{}", out);
            }
        }

        self.event_rx = Some(events);
        info!("Bot stopped");
        Ok(())
    }

    /// Housekeeping: delayed directory save and the periodic flood advert.
    pub fn tick(&mut self) {
        let now = self.clock.now_millis();
        let delay_ms = self.config.storage.save_delay_seconds.saturating_mul(1000);
        if self.persistence() && self.peers.save_due(now, delay_ms) {
            self.save_peers();
        }

        let minutes = self.config.bot.flood_advert_interval_minutes;
        let interval_ms = u64::from(minutes).saturating_mul(60_000);
        if minutes > 0 && now.saturating_sub(self.last_flood_advert) >= interval_ms {
            self.last_flood_advert = now;
            match self
                .transport
                .send_advert(&self.config.bot.name, AdvertScope::Flood)
            {
                Ok(()) => debug!("Flood advert sent"),
                Err(e) => warn!("Flood advert failed: {}", e),
            }
        }
    }

    pub async fn handle_mesh_event(&mut self, event: MeshEvent) {
        match event {
            MeshEvent::ChannelMessage(msg) => self.handle_channel_message(msg).await,
            MeshEvent::PeerDiscovered(record) => {
                if record.is_relay() && self.config.reply.enable_stats {
                    self.engine
                        .relays_mut()
                        .set_name(record.relay_id(), &record.name);
                }
                let now = self.clock.now_millis();
                if self.peers.on_discovered(record, now) == Upsert::Rejected {
                    self.console_out
                        .push("   (peer table full, new peer ignored)".to_string());
                }
            }
            MeshEvent::PeerPathUpdated(record) => {
                let now = self.clock.now_millis();
                if !self.peers.on_path_updated(&record, now) {
                    debug!(
                        "Path update for unknown peer {}",
                        escape_log(&record.name)
                    );
                }
            }
        }
    }

    async fn handle_channel_message(&mut self, msg: ChannelMessage) {
        info!("Channel: {}", escape_log(&msg.text));
        let outcome = self.engine.on_message(self.clock.as_mut(), &msg);
        if let Some(update) = self.engine.take_clock_update() {
            self.console_out.push(clock_update_line(update));
        }
        match outcome {
            ReplyOutcome::Silent => {}
            ReplyOutcome::Suppressed { .. } => {
                self.console_out.push("Quiet please!".to_string());
            }
            ReplyOutcome::Send(text) => {
                let pause = self.config.reply.pre_send_pause();
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
                let sent = self.send_text(&text);
                self.console_out.push(send_result_line(sent));
                if sent {
                    let now = self.clock.now_millis();
                    self.engine.record_sent(now);
                }
            }
        }
    }

    /// Send `"<name>: <body>"` on the bot channel. Returns whether the transport
    /// accepted it; the caller reports the outcome.
    fn send_text(&mut self, body: &str) -> bool {
        let text = outgoing_text(&self.config.bot.name, body, self.config.reply.max_text_len);
        let payload = group_text_payload(self.clock.epoch_seconds(), &text);
        match self
            .transport
            .send_channel(self.config.bot.channel, &payload)
        {
            Ok(()) => {
                debug!("Sent: {}", escape_log(&text));
                true
            }
            Err(e) => {
                warn!("Channel send failed: {}", e);
                false
            }
        }
    }

    /// Execute one console line and return what it prints.
    pub fn handle_console_line(&mut self, line: &str) -> Vec<String> {
        let command = ConsoleCommand::parse(line);
        debug!("Console command {:?}", command);
        match command {
            ConsoleCommand::Public(text) => {
                let sent = self.send_text(&text);
                vec![send_result_line(sent)]
            }
            ConsoleCommand::Clock => vec![format_clock(self.clock.epoch_seconds())],
            ConsoleCommand::Time(secs) => {
                let update = self.engine.set_clock(self.clock.as_mut(), secs);
                vec![clock_update_line(update)]
            }
            ConsoleCommand::Quiet => {
                self.engine.force_quiet();
                vec!["   (quiet set).".to_string()]
            }
            ConsoleCommand::Advert => {
                match self
                    .transport
                    .send_advert(&self.config.bot.name, AdvertScope::ZeroHop)
                {
                    Ok(()) => vec!["   (advert sent, zero hop).".to_string()],
                    Err(e) => {
                        warn!("Advert failed: {}", e);
                        vec!["   ERR: unable to send".to_string()]
                    }
                }
            }
            ConsoleCommand::Stats => {
                let mut lines: Vec<String> = self
                    .engine
                    .stats_lines(self.clock.as_ref())
                    .into_iter()
                    .map(|l| format!("   {}", l))
                    .collect();
                lines.push(format!(
                    "   known peers: {}/{}",
                    self.peers.table().len(),
                    self.peers.table().capacity()
                ));
                lines
            }
            ConsoleCommand::Repeaters => self
                .engine
                .relays()
                .iter()
                .map(|(id, slot)| {
                    format!(
                        "{:02X} {} {} {}",
                        id, slot.name, slot.first_hop_count, slot.total_hop_count
                    )
                })
                .collect(),
            ConsoleCommand::Ver => vec![format!(
                "{} ({})",
                self.config.bot.firmware_version, self.config.bot.firmware_build
            )],
            ConsoleCommand::Reboot => {
                self.reboot();
                let mut lines = self.drain_console();
                lines.push("   (rebooted).".to_string());
                lines
            }
            ConsoleCommand::Shutdown => {
                self.shutdown();
                let mut lines = self.drain_console();
                lines.push("   (shutting down).".to_string());
                lines
            }
            ConsoleCommand::Help => help_lines(),
            ConsoleCommand::Unknown(cmd) => {
                vec![format!("   ERROR: unknown command: {}", cmd)]
            }
        }
    }

    /// Save the directory and start over with fresh in-memory state.
    pub fn reboot(&mut self) {
        info!("Rebooting bot state");
        self.save_peers();
        let now = self.clock.now_millis();
        self.engine = ReplyEngine::new(&self.config.reply, &self.config.bot.plain_name(), now);
        self.peers = PeerStore::new(
            self.config.storage.peers_path(),
            self.config.storage.max_peers,
        );
        self.line_buffer = LineBuffer::new();
        self.last_flood_advert = now;
        self.load_peers();
    }

    /// Save the directory and stop the control loop.
    pub fn shutdown(&mut self) {
        info!("Shutting down bot...");
        self.save_peers();
        self.running = false;
    }
}

fn clock_update_line(update: ClockUpdate) -> String {
    match update {
        ClockUpdate::Set(_) => "   (OK - clock set!)".to_string(),
        ClockUpdate::Rejected { .. } => "   (ERR: clock cannot go backwards)".to_string(),
    }
}

fn send_result_line(sent: bool) -> String {
    if sent {
        "   Sent.".to_string()
    } else {
        "   ERROR: unable to send".to_string()
    }
}

/// `HH:MM - d/m/YYYY UTC`
pub fn format_clock(epoch_secs: u32) -> String {
    match DateTime::<Utc>::from_timestamp(i64::from(epoch_secs), 0) {
        Some(dt) => dt.format("%H:%M - %-d/%-m/%Y UTC").to_string(),
        None => format!("{} (epoch seconds)", epoch_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{ManualClock, TransportError, GROUP_TEXT_HEADER_LEN};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Outbox(Arc<Mutex<Vec<String>>>);

    impl Transport for Outbox {
        fn send_channel(&mut self, _channel: u8, payload: &[u8]) -> Result<(), TransportError> {
            let text = String::from_utf8_lossy(&payload[GROUP_TEXT_HEADER_LEN..]).into_owned();
            self.0.lock().unwrap().push(text);
            Ok(())
        }

        fn send_advert(&mut self, _name: &str, _scope: AdvertScope) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn server() -> (BotServer, Outbox, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_string_lossy().into_owned();
        config.reply.pre_send_pause_ms = 0;
        let outbox = Outbox::default();
        let server = BotServer::new(
            config,
            Box::new(outbox.clone()),
            Box::new(ManualClock::new(0, 0)),
        )
        .unwrap();
        (server, outbox, dir)
    }

    #[test]
    fn clock_format() {
        assert_eq!(format_clock(0), "00:00 - 1/1/1970 UTC");
        assert_eq!(format_clock(1_700_000_000), "22:13 - 14/11/2023 UTC");
    }

    #[test]
    fn ver_and_help() {
        let (mut s, _outbox, _dir) = server();
        assert_eq!(s.handle_console_line("ver"), vec!["v1.0.0 (2026-02-25)"]);
        let help = s.handle_console_line("help");
        assert!(help.iter().any(|l| l.contains("public <text>")));
    }

    #[tokio::test]
    async fn public_command_sends_prefixed_text() {
        let (mut s, outbox, _dir) = server();
        let out = s.handle_console_line("public hello");
        assert_eq!(out, vec!["   Sent."]);
        assert_eq!(*outbox.0.lock().unwrap(), vec!["Mr.Pong🏓: hello".to_string()]);
        // console sends do not count as auto-replies
        assert_eq!(s.engine().counters().sent, 0);
    }

    #[test]
    fn public_output_excludes_pending_notices() {
        let (mut s, _outbox, _dir) = server();
        s.console_out.push("   ERROR: relay directory not saved: disk full".to_string());
        assert_eq!(s.handle_console_line("public hi"), vec!["   Sent."]);
        assert_eq!(s.drain_console().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_loop() {
        let (mut s, _outbox, _dir) = server();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(b"shutdown\r".to_vec()).unwrap();
        s.run_with_console(rx).await.unwrap();
        assert!(!s.is_running());
    }
}
