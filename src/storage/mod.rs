//! # Storage Module - Relay Directory Persistence
//!
//! Keeps the in-memory table of known mesh peers and persists the relay-type ones
//! to a flat binary file so they survive a reboot.
//!
//! ## File Format
//!
//! The file is a plain sequence of 140-byte records (see [`record`]); there is no
//! header, no record count and no checksum. Reading stops at the first short read,
//! so a file truncated mid-record loses only the partial tail.
//!
//! ## Durability
//!
//! A save rewrites the whole file in place (truncate, then append record by record)
//! under an exclusive advisory lock. A failing write aborts that save; records that
//! were already flushed stay on disk. There is no atomic replace.
//!
//! ## Relay Names
//!
//! Every load and every save pushes the names of persisted relays into the
//! [`RelayStatsTracker`], keyed by the first byte of each relay's public key.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pingbot::bot::relays::RelayStatsTracker;
//! use pingbot::storage::PeerStore;
//!
//! let mut relays = RelayStatsTracker::new();
//! let mut store = PeerStore::new("./data/relays.bin", 350);
//! let loaded = store.load(&mut relays).unwrap_or(0);
//! println!("{} peers restored", loaded);
//! ```

pub mod errors;
pub mod record;

pub use errors::PeerStoreError;
pub use record::{PeerKind, PeerRecord, RECORD_LEN};

use fs2::FileExt;
use log::{debug, info, trace, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::bot::relays::RelayStatsTracker;
use crate::logutil::{escape_log, key_prefix};

/// Result of offering a peer to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    /// Table full; the new peer was dropped.
    Rejected,
}

/// Bounded peer table keyed by public key. Identity never changes once inserted.
#[derive(Debug, Clone)]
pub struct PeerTable {
    peers: Vec<PeerRecord>,
    capacity: usize,
}

impl PeerTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            peers: Vec::new(),
            capacity,
        }
    }

    pub fn upsert(&mut self, record: PeerRecord) -> Upsert {
        if let Some(existing) = self
            .peers
            .iter_mut()
            .find(|p| p.public_key == record.public_key)
        {
            existing.name = record.name;
            existing.kind = record.kind;
            existing.flags = record.flags;
            existing.last_advert = record.last_advert;
            existing.out_path = record.out_path;
            return Upsert::Updated;
        }
        if self.peers.len() >= self.capacity {
            return Upsert::Rejected;
        }
        self.peers.push(record);
        Upsert::Inserted
    }

    /// Replace the route of a known peer; unknown peers are ignored.
    pub fn update_path(&mut self, public_key: &[u8; record::KEY_LEN], path: Option<Vec<u8>>) -> bool {
        match self.peers.iter_mut().find(|p| &p.public_key == public_key) {
            Some(existing) => {
                existing.out_path = path;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, public_key: &[u8; record::KEY_LEN]) -> Option<&PeerRecord> {
        self.peers.iter().find(|p| &p.public_key == public_key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.iter()
    }

    pub fn relays(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.iter().filter(|p| p.is_relay())
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Read records until the first short read. A partial trailing record is dropped.
pub fn read_records<R: Read>(reader: &mut R) -> Vec<PeerRecord> {
    let mut records = Vec::new();
    let mut buf = [0u8; RECORD_LEN];
    loop {
        match reader.read_exact(&mut buf) {
            Ok(()) => {
                if let Some(rec) = PeerRecord::decode(&buf) {
                    records.push(rec);
                }
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => {
                warn!(
                    "Relay directory read stopped after {} records: {}",
                    records.len(),
                    e
                );
                break;
            }
        }
    }
    records
}

/// Write the relay-type records among `records`; others are skipped.
/// Returns how many records were written. Each record is handed to `writer`
/// whole, so on failure `written` counts the records ahead of the failed one;
/// pass an unbuffered writer for that count to match what reached the file.
pub fn write_records<'a, W, I>(writer: &mut W, records: I) -> Result<usize, PeerStoreError>
where
    W: Write,
    I: IntoIterator<Item = &'a PeerRecord>,
{
    let mut written = 0usize;
    let mut buf = Vec::with_capacity(RECORD_LEN);
    for rec in records.into_iter().filter(|r| r.is_relay()) {
        buf.clear();
        rec.encode(&mut buf);
        writer
            .write_all(&buf)
            .map_err(|source| PeerStoreError::PartialWrite { written, source })?;
        written += 1;
    }
    writer
        .flush()
        .map_err(|source| PeerStoreError::PartialWrite { written, source })?;
    Ok(written)
}

/// File-backed relay directory plus the in-memory peer table it feeds.
pub struct PeerStore {
    path: PathBuf,
    table: PeerTable,
    /// Millisecond timestamp of the first change not yet written.
    dirty_since: Option<u64>,
}

impl PeerStore {
    pub fn new<P: AsRef<Path>>(path: P, capacity: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            table: PeerTable::new(capacity),
            dirty_since: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &PeerTable {
        &self.table
    }

    /// Fill the table from disk. A missing file is a normal cold start (`Ok(0)`);
    /// any other open failure leaves the table empty and is returned to the caller.
    pub fn load(&mut self, relays: &mut RelayStatsTracker) -> Result<usize, PeerStoreError> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(
                    "No relay directory at {}; starting empty",
                    self.path.display()
                );
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let mut loaded = 0usize;
        for rec in read_records(&mut file) {
            if rec.is_relay() {
                relays.set_name(rec.relay_id(), &rec.name);
            }
            match self.table.upsert(rec) {
                Upsert::Rejected => {
                    warn!(
                        "Peer table full ({}); ignoring remaining directory records",
                        self.table.capacity()
                    );
                    break;
                }
                _ => loaded += 1,
            }
        }
        info!("Loaded {} peers from {}", loaded, self.path.display());
        Ok(loaded)
    }

    /// Rewrite the directory file from the current table (relay-type peers only).
    pub fn save(&mut self, relays: &mut RelayStatsTracker) -> Result<usize, PeerStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(PeerStoreError::Locked(self.path.display().to_string()));
        }

        let result = file
            .set_len(0)
            .map_err(PeerStoreError::from)
            .and_then(|_| {
                let mut writer = &file;
                write_records(&mut writer, self.table.iter())
            });
        let _ = FileExt::unlock(&file);

        let written = result?;
        for rec in self.table.relays() {
            relays.set_name(rec.relay_id(), &rec.name);
        }
        self.dirty_since = None;
        debug!("Saved {} relays to {}", written, self.path.display());
        Ok(written)
    }

    /// Apply a discovery event. Relay-type changes mark the directory dirty.
    pub fn on_discovered(&mut self, record: PeerRecord, now_ms: u64) -> Upsert {
        let is_relay = record.is_relay();
        let label = format!("{} ({})", escape_log(&record.name), key_prefix(&record.public_key));
        let outcome = self.table.upsert(record);
        match outcome {
            Upsert::Inserted => debug!("New peer {}", label),
            Upsert::Updated => trace!("Refreshed peer {}", label),
            Upsert::Rejected => warn!("Peer table full; dropped {}", label),
        }
        if is_relay && outcome != Upsert::Rejected {
            self.mark_dirty(now_ms);
        }
        outcome
    }

    /// Apply a path-update event for an already known peer.
    pub fn on_path_updated(&mut self, record: &PeerRecord, now_ms: u64) -> bool {
        let updated = self
            .table
            .update_path(&record.public_key, record.out_path.clone());
        if updated && record.is_relay() {
            self.mark_dirty(now_ms);
        }
        updated
    }

    fn mark_dirty(&mut self, now_ms: u64) {
        if self.dirty_since.is_none() {
            self.dirty_since = Some(now_ms);
        }
    }

    /// Forget the pending change without writing it.
    pub fn clear_dirty(&mut self) {
        self.dirty_since = None;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_since.is_some()
    }

    /// True once the oldest unsaved change is at least `delay_ms` old.
    pub fn save_due(&self, now_ms: u64, delay_ms: u64) -> bool {
        self.dirty_since
            .map(|since| now_ms.saturating_sub(since) >= delay_ms)
            .unwrap_or(false)
    }
}
