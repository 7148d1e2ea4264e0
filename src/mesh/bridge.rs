//! JSON-lines bridge to an external radio process.
//!
//! Inbound: one [`MeshEvent`] per line, read from a file or FIFO and forwarded to
//! the bot's event channel. Outbound: one [`OutboxEntry`] per line, appended to a
//! file the radio process consumes.
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use super::{AdvertScope, MeshEvent, Transport, TransportError, GROUP_TEXT_HEADER_LEN};
use crate::logutil::escape_log;

/// Parse a single bridge line. Blank lines and `#` comments yield `None`.
pub fn parse_event_line(line: &str) -> Option<Result<MeshEvent, serde_json::Error>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(trimmed))
}

/// Spawn a task that reads events from `path` until EOF and forwards them.
/// Malformed lines are logged and skipped.
pub fn spawn_feed_reader(
    path: String,
    tx: mpsc::UnboundedSender<MeshEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) => {
                warn!("Cannot open event feed {}: {}", path, e);
                return;
            }
        };
        info!("Reading mesh events from {}", path);
        let mut lines = BufReader::new(file).lines();
        let mut line_no = 0usize;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    line_no += 1;
                    match parse_event_line(&line) {
                        None => {}
                        Some(Ok(ev)) => {
                            if tx.send(ev).is_err() {
                                debug!("Event channel closed; stopping feed reader");
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(
                                "Skipping feed line {} ({}): {}",
                                line_no,
                                e,
                                escape_log(&line)
                            );
                        }
                    }
                }
                Ok(None) => {
                    info!("Event feed {} reached EOF after {} lines", path, line_no);
                    break;
                }
                Err(e) => {
                    warn!("Event feed {} read error: {}", path, e);
                    break;
                }
            }
        }
    })
}

/// One outbound action as written to the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboxEntry {
    Channel {
        channel: u8,
        timestamp: u32,
        text: String,
    },
    Advert {
        name: String,
        scope: AdvertScope,
    },
}

/// Transport that appends every send to a JSON-lines file.
pub struct JsonLinesTransport {
    out: File,
}

impl JsonLinesTransport {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TransportError> {
        let out = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { out })
    }

    fn append(&mut self, entry: &OutboxEntry) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        self.out.write_all(line.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

impl Transport for JsonLinesTransport {
    fn send_channel(&mut self, channel: u8, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() < GROUP_TEXT_HEADER_LEN {
            return Err(TransportError::InvalidPayload(payload.len()));
        }
        let mut ts = [0u8; 4];
        ts.copy_from_slice(&payload[..4]);
        let entry = OutboxEntry::Channel {
            channel,
            timestamp: u32::from_le_bytes(ts),
            text: String::from_utf8_lossy(&payload[GROUP_TEXT_HEADER_LEN..]).into_owned(),
        };
        self.append(&entry)
    }

    fn send_advert(&mut self, name: &str, scope: AdvertScope) -> Result<(), TransportError> {
        self.append(&OutboxEntry::Advert {
            name: name.to_string(),
            scope,
        })
    }
}
