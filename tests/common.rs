//! Test utilities & fixtures.
//! Builds a bot wired to a hand-driven clock and a transport that records sends.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use pingbot::bot::BotServer;
use pingbot::config::Config;
use pingbot::mesh::{
    AdvertScope, ChannelMessage, ManualClock, RouteKind, Transport, TransportError,
    GROUP_TEXT_HEADER_LEN,
};
use pingbot::storage::{PeerKind, PeerRecord};

/// What the bot handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Channel { channel: u8, text: String },
    Advert { name: String, scope: AdvertScope },
}

/// Transport whose clones share one send log; can be switched to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    pub sent: Arc<Mutex<Vec<Sent>>>,
    pub fail: Arc<Mutex<bool>>,
}

impl RecordingTransport {
    pub fn channel_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Channel { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    fn check(&self) -> Result<(), TransportError> {
        if *self.fail.lock().unwrap() {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "radio busy",
            )));
        }
        Ok(())
    }
}

impl Transport for RecordingTransport {
    fn send_channel(&mut self, channel: u8, payload: &[u8]) -> Result<(), TransportError> {
        self.check()?;
        let text = String::from_utf8_lossy(&payload[GROUP_TEXT_HEADER_LEN..]).into_owned();
        self.sent.lock().unwrap().push(Sent::Channel { channel, text });
        Ok(())
    }

    fn send_advert(&mut self, name: &str, scope: AdvertScope) -> Result<(), TransportError> {
        self.check()?;
        self.sent.lock().unwrap().push(Sent::Advert {
            name: name.to_string(),
            scope,
        });
        Ok(())
    }
}

/// Default config pointed at `tmp`, without the pre-send pause.
pub fn test_config(tmp: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = tmp.path().to_string_lossy().to_string();
    config.reply.pre_send_pause_ms = 0;
    config
}

pub struct Harness {
    pub bot: BotServer,
    pub clock: ManualClock,
    pub transport: RecordingTransport,
    pub tmp: tempfile::TempDir,
}

pub fn harness_with(config: impl FnOnce(&mut Config)) -> Harness {
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut cfg = test_config(&tmp);
    config(&mut cfg);
    let clock = ManualClock::new(1_000, 1_000);
    let transport = RecordingTransport::default();
    let bot = BotServer::new(cfg, Box::new(transport.clone()), Box::new(clock.clone()))
        .expect("bot server");
    Harness {
        bot,
        clock,
        transport,
        tmp,
    }
}

pub fn harness() -> Harness {
    harness_with(|_| {})
}

pub fn channel_msg(text: &str, path: &[u8], snr: f32) -> ChannelMessage {
    ChannelMessage {
        text: text.to_string(),
        path: path.to_vec(),
        timestamp: 0,
        route: RouteKind::Flood,
        snr,
    }
}

/// Relay whose public key starts with `first_byte`.
pub fn relay(first_byte: u8, name: &str) -> PeerRecord {
    let mut key = [0x5Au8; 32];
    key[0] = first_byte;
    PeerRecord::new(key, name, PeerKind::Repeater)
}

pub fn chat_peer(first_byte: u8, name: &str) -> PeerRecord {
    let mut key = [0xC3u8; 32];
    key[0] = first_byte;
    PeerRecord::new(key, name, PeerKind::Chat)
}
