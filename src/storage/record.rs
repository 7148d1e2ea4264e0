//! Fixed-width relay directory record.
//!
//! Each record is exactly [`RECORD_LEN`] bytes, no header, no count, no checksum:
//!
//! ```text
//! offset  size  field
//!      0    32  public key
//!     32    32  name (UTF-8, NUL padded)
//!     64     1  type tag
//!     65     1  flags
//!     66     1  reserved (0)
//!     67     4  reserved (0)
//!     71     1  path length (0..=64, 0xFF = unknown)
//!     72     4  last advert timestamp (u32 LE, epoch seconds)
//!     76    64  path bytes (zero padded)
//! ```
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::validation::clamp_utf8;

pub const KEY_LEN: usize = 32;
pub const NAME_LEN: usize = 32;
pub const MAX_PATH_LEN: usize = 64;
pub const RECORD_LEN: usize = KEY_LEN + NAME_LEN + 1 + 1 + 1 + 4 + 1 + 4 + MAX_PATH_LEN;

/// Path length byte meaning "no route known yet".
const PATH_UNKNOWN: u8 = 0xFF;

/// Advertised role of a mesh peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    None,
    Chat,
    Repeater,
    Room,
    Sensor,
    Other(u8),
}

impl PeerKind {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => PeerKind::None,
            1 => PeerKind::Chat,
            2 => PeerKind::Repeater,
            3 => PeerKind::Room,
            4 => PeerKind::Sensor,
            other => PeerKind::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            PeerKind::None => 0,
            PeerKind::Chat => 1,
            PeerKind::Repeater => 2,
            PeerKind::Room => 3,
            PeerKind::Sensor => 4,
            PeerKind::Other(b) => b,
        }
    }

    pub fn is_relay(self) -> bool {
        self == PeerKind::Repeater
    }
}

/// One known mesh peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    #[serde(with = "key_hex")]
    pub public_key: [u8; KEY_LEN],
    pub name: String,
    pub kind: PeerKind,
    #[serde(default)]
    pub flags: u8,
    /// Timestamp carried by the peer's last advertisement (epoch seconds).
    #[serde(default)]
    pub last_advert: u32,
    /// Last known route towards the peer, `None` until one is learned.
    #[serde(default)]
    pub out_path: Option<Vec<u8>>,
}

impl PeerRecord {
    pub fn new(public_key: [u8; KEY_LEN], name: &str, kind: PeerKind) -> Self {
        Self {
            public_key,
            name: name.to_string(),
            kind,
            flags: 0,
            last_advert: 0,
            out_path: None,
        }
    }

    /// Slot in the one-byte relay table. Different relays sharing a first key byte
    /// land in the same slot.
    pub fn relay_id(&self) -> u8 {
        self.public_key[0]
    }

    pub fn is_relay(&self) -> bool {
        self.kind.is_relay()
    }

    /// Append exactly [`RECORD_LEN`] bytes. Names longer than the field and paths
    /// longer than [`MAX_PATH_LEN`] are cut.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.public_key);

        let name = clamp_utf8(&self.name, NAME_LEN);
        buf.put_slice(name.as_bytes());
        buf.put_bytes(0, NAME_LEN - name.len());

        buf.put_u8(self.kind.as_byte());
        buf.put_u8(self.flags);
        buf.put_u8(0);
        buf.put_u32_le(0);

        let path: &[u8] = match &self.out_path {
            Some(p) => &p[..p.len().min(MAX_PATH_LEN)],
            None => &[],
        };
        match &self.out_path {
            Some(_) => buf.put_u8(path.len() as u8),
            None => buf.put_u8(PATH_UNKNOWN),
        }
        buf.put_u32_le(self.last_advert);
        buf.put_slice(path);
        buf.put_bytes(0, MAX_PATH_LEN - path.len());
    }

    /// Decode one record from the front of `raw`; `None` when fewer than
    /// [`RECORD_LEN`] bytes are available.
    pub fn decode(mut raw: &[u8]) -> Option<Self> {
        if raw.len() < RECORD_LEN {
            return None;
        }
        let mut public_key = [0u8; KEY_LEN];
        raw.copy_to_slice(&mut public_key);

        let mut name_field = [0u8; NAME_LEN];
        raw.copy_to_slice(&mut name_field);
        let name_end = name_field.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        let name = String::from_utf8_lossy(&name_field[..name_end]).into_owned();

        let kind = PeerKind::from_byte(raw.get_u8());
        let flags = raw.get_u8();
        raw.advance(1 + 4);

        let path_len = raw.get_u8();
        let last_advert = raw.get_u32_le();
        let mut path_field = [0u8; MAX_PATH_LEN];
        raw.copy_to_slice(&mut path_field);
        let out_path = if usize::from(path_len) <= MAX_PATH_LEN {
            Some(path_field[..usize::from(path_len)].to_vec())
        } else {
            None
        };

        Some(Self {
            public_key,
            name,
            kind,
            flags,
            last_advert,
            out_path,
        })
    }
}

/// Public keys travel as 64 hex characters in the JSON-lines bridge.
mod key_hex {
    use super::KEY_LEN;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::fmt::Write;

    pub fn serialize<S: Serializer>(key: &[u8; KEY_LEN], s: S) -> Result<S::Ok, S::Error> {
        let mut out = String::with_capacity(KEY_LEN * 2);
        for b in key {
            let _ = write!(&mut out, "{:02x}", b);
        }
        s.serialize_str(&out)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; KEY_LEN], D::Error> {
        let text = String::deserialize(d)?;
        if text.len() != KEY_LEN * 2 || !text.is_ascii() {
            return Err(D::Error::custom(format!(
                "public key must be {} hex characters",
                KEY_LEN * 2
            )));
        }
        let mut key = [0u8; KEY_LEN];
        for (i, slot) in key.iter_mut().enumerate() {
            *slot = u8::from_str_radix(&text[i * 2..i * 2 + 2], 16)
                .map_err(|e| D::Error::custom(format!("bad public key hex: {}", e)))?;
        }
        Ok(key)
    }
}
