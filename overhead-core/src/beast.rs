//! BEAST binary framing.
//!
//! Frame layout on the wire:
//!
//! ```text
//! 0x1A | type | 6-byte timestamp | signal | payload
//! ```
//!
//! Input is consumed as chunks that each end in the 0x1A marker (what
//! `read_until(0x1A)` yields), so the marker that opens frame N arrives as the
//! last byte of chunk N-1. Chunks not starting with a type tag are held back
//! and glued to the following chunks until one does. No escape (0x1A 0x1A)
//! removal is done: a payload byte equal to 0x1A splits the frame, and the
//! pieces are dropped as malformed.
//!
//! Only long Mode S frames (type 0x33) are decoded.

use serde::Serialize;

use crate::decode;
use crate::registry::Registry;

/// Frame marker, also the chunk delimiter.
pub const FRAME_MARKER: u8 = 0x1A;

/// Timestamp bytes that flag a multilateration-derived frame.
pub const MLAT_MARKER: [u8; 6] = [0xFF, 0x00, 0x4D, 0x4C, 0x41, 0x54];

/// Type + timestamp + signal + 14-byte payload.
pub const LONG_FRAME_LEN: usize = 22;

const PAYLOAD_OFFSET: usize = 8;

/// Held-back bytes beyond this are noise; the buffer is dropped. Also the
/// longest chunk a stream reader should accept.
pub const MAX_PENDING: usize = 4096;

// ---------------------------------------------------------------------------
// Frame types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameType {
    /// 0x31: Mode A/C reply.
    ModeAc,
    /// 0x32: short (56-bit) Mode S.
    ModeSShort,
    /// 0x33: long (112-bit) Mode S.
    ModeSLong,
    /// 0x34: receiver status.
    Status,
}

impl FrameType {
    pub fn from_tag(tag: u8) -> Option<FrameType> {
        match tag {
            0x31 => Some(FrameType::ModeAc),
            0x32 => Some(FrameType::ModeSShort),
            0x33 => Some(FrameType::ModeSLong),
            0x34 => Some(FrameType::Status),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            FrameType::ModeAc => 0x31,
            FrameType::ModeSShort => 0x32,
            FrameType::ModeSLong => 0x33,
            FrameType::Status => 0x34,
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// 48-bit receiver timestamp: 18 bits of seconds since UTC midnight, 30 bits
/// of nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BeastTimestamp {
    pub day_seconds: u32,
    pub nanos: u32,
}

impl BeastTimestamp {
    pub fn from_bytes(bytes: &[u8; 6]) -> Self {
        let value = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
        BeastTimestamp {
            day_seconds: ((value >> 30) & 0x3FFFF) as u32,
            nanos: (value & 0x3FFF_FFFF) as u32,
        }
    }

    /// Unix time, given the Unix time of the UTC midnight the receiver counts from.
    pub fn to_unix(&self, midnight: f64) -> f64 {
        midnight + self.day_seconds as f64 + self.nanos as f64 * 1e-9
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// One decoded-length long Mode S frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeastFrame {
    /// `None` for multilateration frames, whose timestamp field is a marker.
    pub timestamp: Option<BeastTimestamp>,
    pub is_mlat: bool,
    pub signal: u8,
    pub payload: Vec<u8>,
}

/// Parse one reassembled message (type tag first, trailing marker optional).
///
/// The trailing marker is not a frame byte. Returns `None` for every type but
/// long Mode S and for messages shorter than a long frame.
pub fn parse_frame(message: &[u8]) -> Option<BeastFrame> {
    let message = message.strip_suffix(&[FRAME_MARKER]).unwrap_or(message);
    let kind = FrameType::from_tag(*message.first()?)?;
    if kind != FrameType::ModeSLong || message.len() < LONG_FRAME_LEN {
        return None;
    }

    let ts: [u8; 6] = message[1..7].try_into().ok()?;
    let is_mlat = ts == MLAT_MARKER;
    let timestamp = (!is_mlat).then(|| BeastTimestamp::from_bytes(&ts));

    Some(BeastFrame {
        timestamp,
        is_mlat,
        signal: message[7],
        payload: message[PAYLOAD_OFFSET..LONG_FRAME_LEN].to_vec(),
    })
}

/// Split a byte buffer into marker-terminated chunks, as a stream reader would.
pub fn chunks(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.split_inclusive(|&b| b == FRAME_MARKER)
}

// ---------------------------------------------------------------------------
// Reassembly
// ---------------------------------------------------------------------------

/// Per-connection chunk buffer.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    pending: Vec<u8>,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one marker-terminated chunk.
    ///
    /// When the chunk starts with a type tag, everything buffered so far
    /// (this chunk included) is taken as one message and parsed; otherwise
    /// the chunk is held back.
    pub fn push(&mut self, chunk: &[u8]) -> Option<BeastFrame> {
        let first = *chunk.first()?;
        self.pending.extend_from_slice(chunk);

        if FrameType::from_tag(first).is_none() {
            if self.pending.len() > MAX_PENDING {
                tracing::debug!(bytes = self.pending.len(), "discarding unframed input");
                self.pending.clear();
            }
            return None;
        }

        let message = std::mem::take(&mut self.pending);
        let frame = parse_frame(&message);
        if frame.is_none() {
            tracing::trace!(len = message.len(), tag = message[0], "frame dropped");
        }
        frame
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Offline demux
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DemuxStats {
    /// Long Mode S frames extracted.
    pub frames: u64,
    /// Frames the Mode S decoder accepted.
    pub decoded: u64,
}

/// Run a complete captured byte buffer through reassembly and decoding.
pub fn demux_bytes(data: &[u8], registry: &Registry, now: f64) -> DemuxStats {
    let mut reassembler = FrameReassembler::new();
    let mut stats = DemuxStats::default();

    for chunk in chunks(data) {
        if let Some(frame) = reassembler.push(chunk) {
            stats.frames += 1;
            if decode::decode_message(&frame.payload, frame.is_mlat, registry, now).is_some() {
                stats.decoded += 1;
            }
        }
    }
    stats
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
