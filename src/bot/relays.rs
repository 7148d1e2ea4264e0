//! Per-relay hop statistics.
//!
//! Relays are identified by a single byte (the first byte of their public key), so
//! the table is a fixed array of 256 slots indexed by that byte. Nothing is ever
//! added or evicted; slots start at zero with a placeholder name.

use crate::validation::sanitize_name;

pub const DEFAULT_RELAY_NAME: &str = "UnknownRepeater";

/// One slot per possible first key byte.
pub const RELAY_SLOTS: usize = 256;

/// Longest display name kept per slot (matches the on-disk name field).
const MAX_NAME_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCounter {
    pub first_hop_count: u32,
    pub total_hop_count: u32,
    pub name: String,
}

impl Default for RelayCounter {
    fn default() -> Self {
        Self {
            first_hop_count: 0,
            total_hop_count: 0,
            name: DEFAULT_RELAY_NAME.to_string(),
        }
    }
}

/// One row of a first-hop ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedRelay {
    pub id: u8,
    pub name: String,
    pub first_hop_count: u32,
}

#[derive(Debug, Clone)]
pub struct RelayStatsTracker {
    slots: [RelayCounter; RELAY_SLOTS],
}

impl Default for RelayStatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayStatsTracker {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| RelayCounter::default()),
        }
    }

    /// Count one relayed reply path. The first element is the first hop; every
    /// element (the first included) adds to its total.
    pub fn record_path(&mut self, path: &[u8]) {
        let Some(&first) = path.first() else {
            return;
        };
        let slot = &mut self.slots[usize::from(first)];
        slot.first_hop_count = slot.first_hop_count.saturating_add(1);
        for &hop in path {
            let slot = &mut self.slots[usize::from(hop)];
            slot.total_hop_count = slot.total_hop_count.saturating_add(1);
        }
    }

    /// Overwrite the display name of a slot. A name that sanitizes to nothing
    /// keeps the previous one, so a nameless advert never blanks a slot.
    pub fn set_name(&mut self, id: u8, name: &str) {
        let clean = sanitize_name(name, MAX_NAME_BYTES);
        if !clean.is_empty() {
            self.slots[usize::from(id)].name = clean;
        }
    }

    pub fn get(&self, id: u8) -> &RelayCounter {
        &self.slots[usize::from(id)]
    }

    pub fn name(&self, id: u8) -> &str {
        &self.slots[usize::from(id)].name
    }

    /// Up to three relays with the largest first-hop counts, best first.
    ///
    /// Single ascending scan with three running maxima; a slot is promoted only
    /// when strictly greater, so on ties the lower id keeps its place. Zero counts
    /// never rank, so fewer than three entries come back on a quiet network.
    pub fn top3(&self) -> Vec<RankedRelay> {
        let mut best: [Option<(u8, u32)>; 3] = [None; 3];
        for (id, slot) in self.slots.iter().enumerate() {
            let count = slot.first_hop_count;
            if count == 0 {
                continue;
            }
            let id = id as u8;
            let beats = |entry: Option<(u8, u32)>| entry.map_or(true, |(_, c)| count > c);
            if beats(best[0]) {
                best[2] = best[1];
                best[1] = best[0];
                best[0] = Some((id, count));
            } else if beats(best[1]) {
                best[2] = best[1];
                best[1] = Some((id, count));
            } else if beats(best[2]) {
                best[2] = Some((id, count));
            }
        }
        best.iter()
            .flatten()
            .map(|&(id, first_hop_count)| RankedRelay {
                id,
                name: self.name(id).to_string(),
                first_hop_count,
            })
            .collect()
    }

    /// Relays that appeared anywhere in a counted path.
    pub fn distinct_active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.total_hop_count > 0).count()
    }

    /// All slots in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &RelayCounter)> {
        self.slots.iter().enumerate().map(|(id, s)| (id as u8, s))
    }
}
