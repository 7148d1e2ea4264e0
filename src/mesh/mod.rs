//! # Mesh Stack Seams
//!
//! The radio, routing, framing and identity layers live outside this crate. This
//! module defines the narrow interfaces the bot consumes from them:
//!
//! - [`MeshEvent`] - inbound channel messages and peer discovery / path updates
//! - [`Transport`] - outbound channel sends and self-adverts
//! - [`Clock`] - monotonic milliseconds plus a settable real-time clock
//!
//! [`bridge`] adapts these seams to JSON lines so an external radio process can
//! drive the bot through a pipe or file.

pub mod bridge;

use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::logutil::escape_log;
use crate::storage::PeerRecord;

/// How an inbound packet reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    #[default]
    Flood,
    Direct,
}

/// Decrypted group-channel text as delivered by the mesh stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// `"<sender>: <body>"` as typed by the sender's client.
    pub text: String,
    /// Relay ids the packet traversed, first hop first.
    #[serde(default)]
    pub path: Vec<u8>,
    /// Sender's timestamp (epoch seconds); 0 when unknown.
    #[serde(default)]
    pub timestamp: u32,
    #[serde(default)]
    pub route: RouteKind,
    /// Signal-to-noise ratio of the last hop, in dB.
    #[serde(default)]
    pub snr: f32,
}

impl ChannelMessage {
    /// Delivered without any relay in between.
    pub fn is_direct(&self) -> bool {
        self.route == RouteKind::Direct || self.path.is_empty()
    }
}

/// Everything the mesh stack can push into the bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MeshEvent {
    ChannelMessage(ChannelMessage),
    PeerDiscovered(PeerRecord),
    PeerPathUpdated(PeerRecord),
}

/// Reach of a self-advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvertScope {
    ZeroHop,
    Flood,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("payload of {0} bytes is not a group text datagram")]
    InvalidPayload(usize),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound half of the mesh stack.
pub trait Transport: Send {
    /// Flood a group-text datagram on `channel`.
    fn send_channel(&mut self, channel: u8, payload: &[u8]) -> Result<(), TransportError>;

    /// Announce this node under `name`.
    fn send_advert(&mut self, name: &str, scope: AdvertScope) -> Result<(), TransportError>;
}

/// Transport used when no radio is attached: sends are logged and accepted.
#[derive(Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send_channel(&mut self, channel: u8, payload: &[u8]) -> Result<(), TransportError> {
        let text = payload.get(GROUP_TEXT_HEADER_LEN..).unwrap_or_default();
        debug!(
            "Mock send (no radio) on channel {}: {}",
            channel,
            escape_log(&String::from_utf8_lossy(text))
        );
        Ok(())
    }

    fn send_advert(&mut self, name: &str, scope: AdvertScope) -> Result<(), TransportError> {
        debug!("Mock advert (no radio) {:?} as {}", scope, escape_log(name));
        Ok(())
    }
}

/// Bytes in front of the text of a group datagram: u32 LE timestamp + flags.
pub const GROUP_TEXT_HEADER_LEN: usize = 5;

/// Build a group-text payload: timestamp, a zero flags byte, then the text.
/// The text must already be bounded by the caller.
pub fn group_text_payload(timestamp: u32, text: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(GROUP_TEXT_HEADER_LEN + text.len());
    payload.extend_from_slice(&timestamp.to_le_bytes());
    payload.push(0);
    payload.extend_from_slice(text.as_bytes());
    payload
}

/// Time source for the bot.
pub trait Clock: Send {
    /// Monotonic milliseconds since boot.
    fn now_millis(&self) -> u64;
    /// Real-time clock, epoch seconds.
    fn epoch_seconds(&self) -> u32;
    /// Overwrite the real-time clock. Forward-only policy is the caller's job.
    fn set_epoch_seconds(&mut self, secs: u32);
}

/// Host clock: `Instant` for the monotonic part, system time plus an adjustable
/// offset for the real-time part.
#[derive(Debug)]
pub struct SystemClock {
    boot: Instant,
    offset_secs: i64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
            offset_secs: 0,
        }
    }

    fn system_secs() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.boot.elapsed().as_millis() as u64
    }

    fn epoch_seconds(&self) -> u32 {
        (Self::system_secs() + self.offset_secs).clamp(0, i64::from(u32::MAX)) as u32
    }

    fn set_epoch_seconds(&mut self, secs: u32) {
        self.offset_secs = i64::from(secs) - Self::system_secs();
    }
}

/// Shared, hand-driven clock. Clones observe the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
    epoch: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new(millis: u64, epoch: u32) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
            epoch: Arc::new(AtomicU32::new(epoch)),
        }
    }

    /// Move both the monotonic and the real-time clock forward.
    pub fn advance(&self, ms: u64) {
        self.millis.fetch_add(ms, Ordering::Relaxed);
        self.epoch
            .fetch_add((ms / 1000) as u32, Ordering::Relaxed);
    }

    pub fn set_millis(&self, ms: u64) {
        self.millis.store(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::Relaxed)
    }

    fn epoch_seconds(&self) -> u32 {
        self.epoch.load(Ordering::Relaxed)
    }

    fn set_epoch_seconds(&mut self, secs: u32) {
        self.epoch.store(secs, Ordering::Relaxed);
    }
}
