//! Shared types, error enum, and decoded message types for overhead-core.

use serde::Serialize;
use thiserror::Error;

/// All errors produced by overhead-core.
#[derive(Debug, Error)]
pub enum OverheadError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OverheadError>;

// ---------------------------------------------------------------------------
// Downlink Formats
// ---------------------------------------------------------------------------

/// DFs that carry the transponder address in bytes 1-3.
pub const DF_EXPLICIT_ADDRESS: &[u8] = &[11, 17, 18];

/// DFs carrying a 13-bit altitude code in bytes 2-3.
pub const DF_ALTITUDE_REPLY: &[u8] = &[0, 4, 16, 20];

/// Extended squitter DFs (ADS-B and TIS-B/ADS-R).
pub const DF_EXTENDED_SQUITTER: &[u8] = &[17, 18];

/// Downlink Format from the top 5 bits of the first byte.
pub fn downlink_format(payload: &[u8]) -> Option<u8> {
    payload.first().map(|b| (b >> 3) & 0x1F)
}

// ---------------------------------------------------------------------------
// Transponder address helpers
// ---------------------------------------------------------------------------

/// 24-bit transponder (ICAO) address.
pub type Address = u32;

/// Format an address as 6-char lowercase hex, the display and sort key.
pub fn address_to_string(address: Address) -> String {
    format!("{:06x}", address & 0xFF_FFFF)
}

/// Parse a 6-char hex string into an address.
pub fn address_from_hex(hex: &str) -> Option<Address> {
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// Read a big-endian 24-bit address starting at `offset`.
pub fn address_from_bytes(data: &[u8], offset: usize) -> Option<Address> {
    let b = data.get(offset..offset + 3)?;
    Some(((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32)
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Decode a hex string into bytes. Case-insensitive, must be even length.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if !hex.len().is_multiple_of(2) {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let high = hex_digit(chunk[0])?;
        let low = hex_digit(chunk[1])?;
        bytes.push((high << 4) | low);
    }
    Some(bytes)
}

/// Like [`hex_decode`] but reports the offending input.
pub fn parse_hex(hex: &str) -> Result<Vec<u8>> {
    hex_decode(hex).ok_or_else(|| OverheadError::InvalidHex(hex.to_string()))
}

/// Encode bytes as uppercase hex string.
pub fn hex_encode(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for &b in data {
        s.push(HEX_CHARS[(b >> 4) as usize] as char);
        s.push(HEX_CHARS[(b & 0x0F) as usize] as char);
    }
    s
}

const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Identification character set
// ---------------------------------------------------------------------------

/// 6-bit identification alphabet. Index 32 is the pad character (space).
pub const CALLSIGN_CHARSET: &[u8; 64] =
    b"@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_ !\"#$%&'()*+,-./0123456789:;<=>?";

// ---------------------------------------------------------------------------
// CPR raw fields
// ---------------------------------------------------------------------------

/// One raw 17-bit CPR latitude/longitude pair as transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RawCpr {
    pub lat: u32,
    pub lon: u32,
}

/// A resolved geodetic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

// ---------------------------------------------------------------------------
// Decoded message types
// ---------------------------------------------------------------------------

/// TC 1-4: identification. `callsign` is `None` when either character group is zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentificationMsg {
    pub callsign: Option<String>,
}

/// TC 5-8 (surface) or TC 9-18/20-22 (airborne): CPR-encoded position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionMsg {
    pub altitude_ft: Option<i32>,
    pub cpr: RawCpr,
    pub cpr_odd: bool,
    pub is_surface: bool,
}

/// Extended squitter content the decoder interprets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SquitterMsg {
    Identification(IdentificationMsg),
    Position(PositionMsg),
}

/// Everything parsed out of one Mode S payload, before it touches the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeSMessage {
    pub df: u8,
    /// Present for DF11/17/18.
    pub address: Option<Address>,
    /// From the 13-bit altitude code of DF0/4/16/20.
    pub altitude_ft: Option<i32>,
    pub squitter: Option<SquitterMsg>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
