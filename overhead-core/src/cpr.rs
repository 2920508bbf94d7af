//! Compact Position Reporting: global CPR decode for ADS-B positions.
//!
//! A position is resolved from one even and one odd frame of the same
//! aircraft. There is no local (single frame + reference) decode: an aircraft
//! that only ever transmits one parity is never positioned.
//!
//! Key constants:
//! - Nb = 17 (bits per coordinate)
//! - Dlat_even = 360 / 60 = 6.0 degrees (airborne), 90 / 60 (surface)
//! - Dlat_odd = 360 / 59 ≈ 6.1017 degrees (airborne), 90 / 59 (surface)

use serde::Serialize;

use crate::types::{Position, RawCpr};

/// Bits per CPR coordinate.
const NB: u32 = 17;

/// Maximum CPR value (2^17 = 131072).
const CPR_MAX: f64 = (1u32 << NB) as f64;

/// Latitude zones for even frames (4 * NZ, NZ = 15).
const EVEN_ZONES: f64 = 60.0;

/// Latitude zones for odd frames (4 * NZ - 1).
const ODD_ZONES: f64 = 59.0;

/// Latitudes (absolute, ascending) at which the longitude zone count drops by one.
///
/// Below the first entry NL is 59; at or above the last entry NL is 1.
const NL_THRESHOLDS: [f64; 58] = [
    10.47047130, 14.82817437, 18.18626357, 21.02939493, 23.54504487, 25.82924707,
    27.93898710, 29.91135686, 31.77209708, 33.53993436, 35.22899598, 36.85025108,
    38.41241892, 39.92256684, 41.38651832, 42.80914012, 44.19454951, 45.54626723,
    46.86733252, 48.16039128, 49.42776439, 50.67150166, 51.89342469, 53.09516153,
    54.27817472, 55.44378444, 56.59318756, 57.72747354, 58.84763776, 59.95459277,
    61.04917774, 62.13216659, 63.20427479, 64.26616523, 65.31845310, 66.36171008,
    67.39646774, 68.42322022, 69.44242631, 70.45451075, 71.45986473, 72.45884545,
    73.45177442, 74.43893416, 75.42056257, 76.39684391, 77.36789461, 78.33374083,
    79.29428225, 80.24923213, 81.19801349, 82.13956981, 83.07199445, 83.99173563,
    84.89166191, 85.75541621, 86.53536998, 87.00000000,
];

/// Number of longitude zones at a given latitude (NL function).
///
/// Table lookup, symmetric about the equator. 59 at the equator, 1 at the poles.
pub fn nl(lat: f64) -> u32 {
    let lat = lat.abs();
    NL_THRESHOLDS
        .iter()
        .position(|&threshold| lat < threshold)
        .map(|i| 59 - i as u32)
        .unwrap_or(1)
}

/// Longitude zone count for a frame parity (N function), never below 1.
pub fn n(lat: f64, odd: bool) -> u32 {
    nl(lat).saturating_sub(odd as u32).max(1)
}

/// Width of one longitude zone in degrees.
pub fn dlon(lat: f64, odd: bool, surface: bool) -> f64 {
    let span = if surface { 90.0 } else { 360.0 };
    span / n(lat, odd) as f64
}

/// Modulo that always returns a non-negative result.
fn modulo(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

/// Normalize longitude into [-180, 180).
fn normalize_lon(lon: f64) -> f64 {
    lon - ((lon + 180.0) / 360.0).floor() * 360.0
}

/// Signed angular difference folded into [-180, 180).
fn angular_diff(a: f64, b: f64) -> f64 {
    normalize_lon(a - b)
}

/// Global CPR decode from an even/odd frame pair.
///
/// `latest_odd` selects which frame's latitude and longitude zone the result
/// is expressed in (the most recently received one). Returns `None` when the
/// two candidate latitudes fall in different NL zones: the pair straddles a
/// zone boundary and any answer would be wrong.
///
/// Surface frames only encode a quarter of the globe; `reference` picks the
/// hemisphere and longitude quadrant nearest to the receiver. Airborne
/// frames ignore it.
pub fn global_decode(
    even: RawCpr,
    odd: RawCpr,
    latest_odd: bool,
    surface: bool,
    reference: &Position,
) -> Option<Position> {
    let span = if surface { 90.0 } else { 360.0 };
    let dlat_even = span / EVEN_ZONES;
    let dlat_odd = span / ODD_ZONES;

    let lat_even_cpr = even.lat as f64 / CPR_MAX;
    let lon_even_cpr = even.lon as f64 / CPR_MAX;
    let lat_odd_cpr = odd.lat as f64 / CPR_MAX;
    let lon_odd_cpr = odd.lon as f64 / CPR_MAX;

    // Latitude zone index
    let j = (59.0 * lat_even_cpr - 60.0 * lat_odd_cpr + 0.5).floor();

    let mut lat_e = dlat_even * (modulo(j, EVEN_ZONES) + lat_even_cpr);
    let mut lat_o = dlat_odd * (modulo(j, ODD_ZONES) + lat_odd_cpr);

    if surface {
        // [0, 90) or the southern solution 90 degrees below it
        if (lat_e - 90.0 - reference.lat).abs() < (lat_e - reference.lat).abs() {
            lat_e -= 90.0;
            lat_o -= 90.0;
        }
    } else {
        if lat_e >= 270.0 {
            lat_e -= 360.0;
        }
        if lat_o >= 270.0 {
            lat_o -= 360.0;
        }
    }

    if lat_e.abs() > 90.0 || lat_o.abs() > 90.0 {
        tracing::trace!(lat_e, lat_o, "CPR pair decodes outside valid latitude");
        return None;
    }

    if nl(lat_e) != nl(lat_o) {
        tracing::trace!(lat_e, lat_o, "CPR pair straddles a latitude zone boundary");
        return None;
    }

    let (lat, lon_cpr) = if latest_odd {
        (lat_o, lon_odd_cpr)
    } else {
        (lat_e, lon_even_cpr)
    };

    let nl_val = nl(lat) as f64;
    let ni = n(lat, latest_odd) as f64;
    let m = (lon_even_cpr * (nl_val - 1.0) - lon_odd_cpr * nl_val + 0.5).floor();
    let mut lon = dlon(lat, latest_odd, surface) * (modulo(m, ni) + lon_cpr);

    if surface {
        lon = (0..4)
            .map(|quadrant| lon + 90.0 * quadrant as f64)
            .min_by(|a, b| {
                angular_diff(*a, reference.lon)
                    .abs()
                    .total_cmp(&angular_diff(*b, reference.lon).abs())
            })
            .unwrap_or(lon);
    }

    Some(Position {
        lat,
        lon: normalize_lon(lon),
    })
}

// ---------------------------------------------------------------------------
// Per-aircraft pairing state
// ---------------------------------------------------------------------------

/// Un-paired raw frame waiting for its complement.
///
/// At most one frame is held, tagged with the kind of message (surface or
/// airborne) it came from. A frame of the same parity or of the other kind
/// replaces it; a frame of the opposite parity and the same kind consumes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum CprBuffer {
    #[default]
    Empty,
    Even { frame: RawCpr, surface: bool },
    Odd { frame: RawCpr, surface: bool },
}

/// An even/odd pair ready for global decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CprPair {
    pub even: RawCpr,
    pub odd: RawCpr,
    /// Parity of the frame that completed the pair.
    pub latest_odd: bool,
    /// Both halves came from surface position messages.
    pub surface: bool,
}

impl CprBuffer {
    /// Feed one raw frame. Returns a pair when the buffered frame has the
    /// opposite parity and the same kind, leaving the buffer empty.
    pub fn push(&mut self, frame: RawCpr, odd: bool, surface: bool) -> Option<CprPair> {
        match (*self, odd) {
            (CprBuffer::Even { frame: even, surface: held }, true) if held == surface => {
                *self = CprBuffer::Empty;
                Some(CprPair {
                    even,
                    odd: frame,
                    latest_odd: true,
                    surface,
                })
            }
            (CprBuffer::Odd { frame: buffered, surface: held }, false) if held == surface => {
                *self = CprBuffer::Empty;
                Some(CprPair {
                    even: frame,
                    odd: buffered,
                    latest_odd: false,
                    surface,
                })
            }
            (_, true) => {
                *self = CprBuffer::Odd { frame, surface };
                None
            }
            (_, false) => {
                *self = CprBuffer::Even { frame, surface };
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CprBuffer::Empty)
    }
}

/// Decode a completed pair, using the receiver position for surface pairs.
pub fn resolve(pair: &CprPair, reference: &Position) -> Option<Position> {
    global_decode(pair.even, pair.odd, pair.latest_odd, pair.surface, reference)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
