//! meshfwd wire formats: everything that crosses the radio.
//!
//! Two kinds of frame share the link:
//!
//!   * chunk frames: one header byte `(index << 4) | count`, then the fragment
//!   * discovery beacons: `ATAKBCAST,<gid>,<uid>,<callsign>,<0|1>` as UTF-8 text
//!
//! Neither carries a length prefix or checksum. Delivery integrity belongs to
//! the radio link. A beacon can never be mistaken for a chunk: its first byte
//! `'A'` (0x41) decodes to index 4 of 1, which is not a valid header.

use bytes::{Bytes, BytesMut};

use crate::identity::{Gid, PeerIdentity};

/// A single header nibble addresses at most 15 chunks.
pub const MAX_CHUNKS: u8 = 15;

/// First field of every discovery beacon.
pub const BEACON_MARKER: &str = "ATAKBCAST";

pub const BEACON_DELIMITER: char = ',';

const BEACON_FIELDS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("payload needs {needed} chunks, at most {max} fit in a header")]
    TooManyChunks { needed: usize, max: u8 },
    #[error("empty payload")]
    EmptyPayload,
    #[error("chunk length must be non-zero")]
    ZeroChunkLength,
    #[error("empty frame")]
    EmptyFrame,
    #[error("chunk count {0} outside 1..=15")]
    InvalidCount(u8),
    #[error("chunk index {index} not below count {count}")]
    IndexOutOfRange { index: u8, count: u8 },
    #[error("beacon is not valid UTF-8")]
    NotUtf8,
    #[error("not a beacon")]
    NotABeacon,
    #[error("beacon has {0} fields, expected 5")]
    FieldCount(usize),
    #[error("beacon gid {0:?} is not a number")]
    InvalidGid(String),
    #[error("beacon flag {0:?} is not 0 or 1")]
    InvalidFlag(String),
    #[error("{field} contains the beacon delimiter")]
    DelimiterInField { field: &'static str },
}

// ── Chunk header ─────────────────────────────────────────────────────────────

/// Position of one chunk within its transmission.
///
/// Invariant: `index < count <= 15`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkHeader {
    index: u8,
    count: u8,
}

impl ChunkHeader {
    pub fn new(index: u8, count: u8) -> Result<Self, WireError> {
        if count == 0 || count > MAX_CHUNKS {
            return Err(WireError::InvalidCount(count));
        }
        if index >= count {
            return Err(WireError::IndexOutOfRange { index, count });
        }
        Ok(Self { index, count })
    }

    pub fn from_byte(byte: u8) -> Result<Self, WireError> {
        Self::new(byte >> 4, byte & 0x0f)
    }

    pub fn to_byte(self) -> u8 {
        (self.index << 4) | self.count
    }

    pub fn index(self) -> u8 {
        self.index
    }

    pub fn count(self) -> u8 {
        self.count
    }

    /// The chunk whose arrival completes a transmission.
    pub fn is_last(self) -> bool {
        self.index + 1 == self.count
    }
}

// ── Chunk frames ─────────────────────────────────────────────────────────────

/// One header byte plus up to `chunk_len` bytes of payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFrame {
    pub header: ChunkHeader,
    pub fragment: Bytes,
}

impl ChunkFrame {
    pub fn decode(frame: Bytes) -> Result<Self, WireError> {
        let first = *frame.first().ok_or(WireError::EmptyFrame)?;
        Ok(Self {
            header: ChunkHeader::from_byte(first)?,
            fragment: frame.slice(1..),
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(1 + self.fragment.len());
        out.extend_from_slice(&[self.header.to_byte()]);
        out.extend_from_slice(&self.fragment);
        out.freeze()
    }
}

/// How many chunks a payload of `len` bytes needs.
pub fn chunk_count(len: usize, max_chunk_bytes: usize) -> Result<u8, WireError> {
    if max_chunk_bytes == 0 {
        return Err(WireError::ZeroChunkLength);
    }
    if len == 0 {
        return Err(WireError::EmptyPayload);
    }

    let needed = len.div_ceil(max_chunk_bytes);
    if needed > MAX_CHUNKS as usize {
        return Err(WireError::TooManyChunks {
            needed,
            max: MAX_CHUNKS,
        });
    }
    Ok(needed as u8)
}

/// Split `payload` into framed chunks of at most `max_chunk_bytes` each.
///
/// Fails without producing anything when the payload needs more than
/// [`MAX_CHUNKS`] chunks.
pub fn split(payload: &[u8], max_chunk_bytes: usize) -> Result<Vec<ChunkFrame>, WireError> {
    let count = chunk_count(payload.len(), max_chunk_bytes)?;
    payload
        .chunks(max_chunk_bytes)
        .enumerate()
        .map(|(i, piece)| {
            Ok(ChunkFrame {
                header: ChunkHeader::new(i as u8, count)?,
                fragment: Bytes::copy_from_slice(piece),
            })
        })
        .collect()
}

/// Concatenate fragments in index order. Missing indices are simply absent
/// from the output.
pub fn join(frames: &[ChunkFrame]) -> Bytes {
    let mut ordered: Vec<&ChunkFrame> = frames.iter().collect();
    ordered.sort_by_key(|f| f.header.index());

    let total = ordered.iter().map(|f| f.fragment.len()).sum();
    let mut out = BytesMut::with_capacity(total);
    for frame in ordered {
        out.extend_from_slice(&frame.fragment);
    }
    out.freeze()
}

// ── Discovery beacon ─────────────────────────────────────────────────────────

/// Plain-text presence announcement broadcast to every reachable node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub gid: Gid,
    pub uid: String,
    pub callsign: String,
    /// Set by a node that just came up. Receivers answer with their own beacon.
    pub initial: bool,
}

impl Beacon {
    pub fn from_identity(identity: &PeerIdentity, initial: bool) -> Self {
        Self {
            gid: identity.gid,
            uid: identity.uid.clone(),
            callsign: identity.callsign.clone(),
            initial,
        }
    }

    /// Cheap check used to route inbound frames.
    pub fn is_beacon(frame: &[u8]) -> bool {
        frame.starts_with(BEACON_MARKER.as_bytes())
    }

    pub fn encode(&self) -> Result<Bytes, WireError> {
        if self.uid.contains(BEACON_DELIMITER) {
            return Err(WireError::DelimiterInField { field: "uid" });
        }
        if self.callsign.contains(BEACON_DELIMITER) {
            return Err(WireError::DelimiterInField { field: "callsign" });
        }
        let text = format!(
            "{BEACON_MARKER},{},{},{},{}",
            self.gid,
            self.uid,
            self.callsign,
            if self.initial { 1 } else { 0 }
        );
        Ok(Bytes::from(text))
    }

    pub fn parse(frame: &[u8]) -> Result<Self, WireError> {
        let text = std::str::from_utf8(frame).map_err(|_| WireError::NotUtf8)?;
        let fields: Vec<&str> = text.split(BEACON_DELIMITER).collect();
        if fields.len() != BEACON_FIELDS {
            return Err(WireError::FieldCount(fields.len()));
        }
        if fields[0] != BEACON_MARKER {
            return Err(WireError::NotABeacon);
        }

        let gid = fields[1]
            .parse()
            .map_err(|_| WireError::InvalidGid(fields[1].to_string()))?;
        let initial = match fields[4] {
            "1" => true,
            "0" => false,
            other => return Err(WireError::InvalidFlag(other.to_string())),
        };

        Ok(Self {
            gid,
            uid: fields[2].to_string(),
            callsign: fields[3].to_string(),
            initial,
        })
    }
}
