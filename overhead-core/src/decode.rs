//! Decode Mode S payloads and fold them into the aircraft registry.
//!
//! Interpreted content:
//! - DF11/17/18:     transponder address (bytes 1-3), creates the record
//! - DF0/4/16/20:    13-bit altitude code; address from the CRC residual
//! - DF17/18 TC 1-4: identification (callsign)
//! - DF17/18 TC 5-8: surface position (CPR)
//! - DF17/18 TC 9-18, 20-22: airborne position (CPR, barometric altitude for 9-18)
//!
//! Everything else (velocity, status, intent, ...) is ignored.

use crate::cpr;
use crate::crc;
use crate::registry::{AircraftRecord, Registry};
use crate::types::*;

// ---------------------------------------------------------------------------
// Altitude decoding
// ---------------------------------------------------------------------------

/// Decode the 13-bit altitude code of DF0/4/16/20.
///
/// M-bit (0x40) and Q-bit (0x10) select the mode:
/// - M=1: metric altitude (recognized, not decoded)
/// - M=0, Q=1: 25-ft increments
/// - M=0, Q=0: 100-ft Gillham gray code (not decoded)
pub fn decode_altitude_13bit(alt_code: u16) -> Option<i32> {
    let alt_code = alt_code as i32 & 0x1FFF;

    if alt_code & 0x0040 != 0 {
        return None;
    }

    if alt_code & 0x0010 != 0 {
        // Remove M and Q bits to get the 11-bit count
        let n = ((alt_code & 0x1F80) >> 2) | ((alt_code & 0x0020) >> 1) | (alt_code & 0x000F);
        return Some(n * 25 - 1000);
    }

    None
}

/// Decode the 12-bit altitude field of an airborne position message.
///
/// Only the Q=1 (25-ft) encoding is supported. Q=0 is Gillham-coded
/// (Mode A to Mode C conversion) and yields `None`.
pub fn decode_ac12(ac12: u16) -> Option<i32> {
    let ac12 = ac12 as i32 & 0x0FFF;
    if ac12 & 0x0010 == 0 {
        return None;
    }
    let n = ((ac12 & 0x0FE0) >> 1) | (ac12 & 0x000F);
    Some(n * 25 - 1000)
}

// ---------------------------------------------------------------------------
// Extended squitter fields
// ---------------------------------------------------------------------------

/// Decode the 8-character callsign of an identification message.
///
/// Two 24-bit groups (bytes 5-7 and 8-10), four 6-bit symbols each. A group
/// that is entirely zero means no callsign was transmitted.
pub fn decode_callsign(payload: &[u8]) -> Option<String> {
    let first = address_from_bytes(payload, 5)?;
    let second = address_from_bytes(payload, 8)?;
    if first == 0 || second == 0 {
        return None;
    }

    let mut callsign = String::with_capacity(8);
    for group in [first, second] {
        for shift in [18, 12, 6, 0] {
            let idx = ((group >> shift) & 0x3F) as usize;
            callsign.push(CALLSIGN_CHARSET[idx] as char);
        }
    }
    Some(callsign)
}

/// Raw 17-bit CPR latitude/longitude and the odd-frame flag (bytes 6-10).
fn decode_raw_cpr(payload: &[u8]) -> (RawCpr, bool) {
    let lat = ((payload[6] as u32 & 0x03) << 15) | ((payload[7] as u32) << 7) | (payload[8] as u32 >> 1);
    let lon = ((payload[8] as u32 & 0x01) << 16) | ((payload[9] as u32) << 8) | payload[10] as u32;
    let odd = payload[6] & 0x04 != 0;
    (RawCpr { lat, lon }, odd)
}

/// Decode the interpreted extended squitter types. `None` for anything else.
pub fn decode_extended_squitter(payload: &[u8]) -> Option<SquitterMsg> {
    if payload.len() < 11 {
        return None;
    }

    let tc = payload[4] >> 3;
    match tc {
        1..=4 => Some(SquitterMsg::Identification(IdentificationMsg {
            callsign: decode_callsign(payload),
        })),
        5..=8 => {
            let (cpr, cpr_odd) = decode_raw_cpr(payload);
            Some(SquitterMsg::Position(PositionMsg {
                altitude_ft: None,
                cpr,
                cpr_odd,
                is_surface: true,
            }))
        }
        9..=18 | 20..=22 => {
            let (cpr, cpr_odd) = decode_raw_cpr(payload);
            // TC 20-22 carry GNSS height, not a barometric AC12 code
            let altitude_ft = if tc <= 18 {
                let ac12 = ((payload[5] as u16) << 4) | (payload[6] as u16 >> 4);
                decode_ac12(ac12)
            } else {
                None
            };
            Some(SquitterMsg::Position(PositionMsg {
                altitude_ft,
                cpr,
                cpr_odd,
                is_surface: false,
            }))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

/// Parse a 7-byte (short) or 14-byte (long) Mode S payload.
///
/// Pure: touches no state. Returns `None` for payloads of any other length.
pub fn parse(payload: &[u8]) -> Option<ModeSMessage> {
    if payload.len() != 7 && payload.len() != 14 {
        return None;
    }

    let df = downlink_format(payload)?;

    let address = if DF_EXPLICIT_ADDRESS.contains(&df) {
        address_from_bytes(payload, 1)
    } else {
        None
    };

    let altitude_ft = if DF_ALTITUDE_REPLY.contains(&df) {
        let alt_code = ((payload[2] as u16) << 8) | payload[3] as u16;
        decode_altitude_13bit(alt_code)
    } else {
        None
    };

    let squitter = if DF_EXTENDED_SQUITTER.contains(&df) {
        decode_extended_squitter(payload)
    } else {
        None
    };

    Some(ModeSMessage {
        df,
        address,
        altitude_ft,
        squitter,
    })
}

// ---------------------------------------------------------------------------
// Registry update
// ---------------------------------------------------------------------------

/// Decode one payload and write the result into the registry.
///
/// Read-modify-write: the record is copied out with `lookup` (or created
/// fresh for DF11/17/18), mutated, and written back whole with `upsert`.
/// Two concurrent updates for the same address race and the later upsert
/// wins in full.
///
/// DF0/4/16/20 replies never create records. Their residual address is only
/// trusted when it already names a record in the registry.
pub fn decode_message(
    payload: &[u8],
    is_mlat: bool,
    registry: &Registry,
    now: f64,
) -> Option<ModeSMessage> {
    let msg = parse(payload)?;

    let mut record = match msg.address {
        Some(address) => registry
            .lookup(address)
            .unwrap_or_else(|| AircraftRecord::new(address, now)),
        None => {
            msg.altitude_ft?;
            let address = crc::residual_address(payload)?;
            registry.lookup(address)?
        }
    };

    record.last_contact = now;
    record.is_mlat = is_mlat;
    record.message_count += 1;

    if let Some(alt) = msg.altitude_ft {
        record.altitude_ft = Some(alt);
    }

    match &msg.squitter {
        Some(SquitterMsg::Identification(m)) => {
            if let Some(callsign) = &m.callsign {
                record.callsign = Some(callsign.clone());
            }
        }
        Some(SquitterMsg::Position(m)) => {
            if let Some(alt) = m.altitude_ft {
                record.altitude_ft = Some(alt);
            }
            if let Some(pair) = record.cpr.push(m.cpr, m.cpr_odd, m.is_surface) {
                match cpr::resolve(&pair, registry.reference()) {
                    Some(position) => {
                        record.position = Some(position);
                        record.last_position = Some(now);
                    }
                    None => tracing::debug!(
                        address = %address_to_string(record.address),
                        "CPR pair rejected"
                    ),
                }
            }
        }
        None => {}
    }

    registry.upsert(record);
    Some(msg)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(hex: &str) -> Vec<u8> {
        hex_decode(hex).expect("valid hex")
    }

    fn registry() -> Registry {
        Registry::new(Position {
            lat: 52.0,
            lon: 4.0,
        })
    }

    /// Short DF4 altitude reply whose parity is overlaid with `address`.
    fn df4_reply(alt_code: u16, address: Address) -> Vec<u8> {
        let mut msg = vec![0x20, 0x00, (alt_code >> 8) as u8 & 0x1F, alt_code as u8, 0, 0, 0];
        let pi = crc::crc24_payload(&msg) ^ address;
        msg[4] = (pi >> 16) as u8;
        msg[5] = (pi >> 8) as u8;
        msg[6] = pi as u8;
        msg
    }

    /// Overwrite the raw CPR fields of a position payload.
    fn set_cpr(p: &mut [u8], lat: u32, lon: u32) {
        p[6] = (p[6] & !0x03) | ((lat >> 15) & 0x03) as u8;
        p[7] = (lat >> 7) as u8;
        p[8] = (((lat & 0x7F) << 1) as u8) | ((lon >> 16) & 0x01) as u8;
        p[9] = (lon >> 8) as u8;
        p[10] = lon as u8;
    }

    const EVEN_POS: &str = "8D40621D58C382D690C8AC2863A7";
    const ODD_POS: &str = "8D40621D58C386435CC412692AD6";
    const KLM_IDENT: &str = "8D4840D6202CC371C32CE0576098";

    // -- Altitude --

    #[test]
    fn test_decode_altitude_13bit_25ft() {
        // n = 1560 → 38000 ft, Q set, M clear
        assert_eq!(decode_altitude_13bit(0x1838), Some(38000));
    }

    #[test]
    fn test_decode_altitude_13bit_metric_unsupported() {
        assert_eq!(decode_altitude_13bit(0x1838 | 0x0040), None);
    }

    #[test]
    fn test_decode_altitude_13bit_gillham_unsupported() {
        assert_eq!(decode_altitude_13bit(0x1828), None);
        assert_eq!(decode_altitude_13bit(0), None);
    }

    #[test]
    fn test_decode_ac12() {
        assert_eq!(decode_ac12(0xC38), Some(38000));
        assert_eq!(decode_ac12(16), Some(-1000));
        assert_eq!(decode_ac12(0x25C), Some(6500));
    }

    #[test]
    fn test_decode_ac12_gillham_unsupported() {
        assert_eq!(decode_ac12(1), None);
        assert_eq!(decode_ac12(0), None);
    }

    // -- Identification --

    #[test]
    fn test_decode_callsign_klm() {
        assert_eq!(decode_callsign(&payload(KLM_IDENT)).as_deref(), Some("KLM1023 "));
    }

    #[test]
    fn test_decode_callsign_ezy() {
        let p = payload("8D406B902015A678D4D220AA4BDA");
        assert_eq!(decode_callsign(&p).as_deref(), Some("EZY85MH "));
    }

    #[test]
    fn test_decode_callsign_trailing_pad() {
        let p = [141, 64, 115, 119, 33, 52, 66, 112, 226, 8, 32, 34, 235, 246];
        assert_eq!(decode_callsign(&p).as_deref(), Some("MDI08   "));
    }

    #[test]
    fn test_decode_callsign_zero_is_empty() {
        let mut p = payload(KLM_IDENT);
        p[5..11].fill(0);
        assert_eq!(decode_callsign(&p), None);

        // Either group zero counts as absent
        let mut p = payload(KLM_IDENT);
        p[8..11].fill(0);
        assert_eq!(decode_callsign(&p), None);
    }

    // -- Extended squitter --

    #[test]
    fn test_decode_position_even() {
        let msg = decode_extended_squitter(&payload(EVEN_POS)).unwrap();
        let SquitterMsg::Position(m) = msg else {
            panic!("expected position, got {msg:?}");
        };
        assert_eq!(m.altitude_ft, Some(38000));
        assert!(!m.cpr_odd);
        assert!(!m.is_surface);
        assert_eq!(m.cpr, RawCpr { lat: 93000, lon: 51372 });
    }

    #[test]
    fn test_decode_position_odd() {
        let msg = decode_extended_squitter(&payload(ODD_POS)).unwrap();
        let SquitterMsg::Position(m) = msg else {
            panic!("expected position, got {msg:?}");
        };
        assert_eq!(m.altitude_ft, Some(38000));
        assert!(m.cpr_odd);
        assert_eq!(m.cpr, RawCpr { lat: 74158, lon: 50194 });
    }

    #[test]
    fn test_decode_position_altitude_6500() {
        let p = [141, 64, 86, 11, 88, 37, 196, 163, 243, 90, 151, 218, 105, 13];
        let Some(SquitterMsg::Position(m)) = decode_extended_squitter(&p) else {
            panic!("expected position");
        };
        assert_eq!(m.altitude_ft, Some(6500));
    }

    #[test]
    fn test_decode_surface_position() {
        let p = [141, 64, 115, 119, 40, 52, 66, 112, 226, 8, 32, 34, 235, 246];
        let Some(SquitterMsg::Position(m)) = decode_extended_squitter(&p) else {
            panic!("expected position");
        };
        assert!(m.is_surface);
        assert_eq!(m.altitude_ft, None);
    }

    #[test]
    fn test_decode_gnss_position_has_no_altitude() {
        let mut p = payload(EVEN_POS);
        p[4] = (20 << 3) | (p[4] & 0x07);
        let Some(SquitterMsg::Position(m)) = decode_extended_squitter(&p) else {
            panic!("expected position");
        };
        assert_eq!(m.altitude_ft, None);
        assert_eq!(m.cpr.lat, 93000);
    }

    #[test]
    fn test_velocity_ignored() {
        assert_eq!(decode_extended_squitter(&payload("8D485020994409940838175B284F")), None);
    }

    // -- Parsing --

    #[test]
    fn test_parse_df17_address() {
        let msg = parse(&payload(KLM_IDENT)).unwrap();
        assert_eq!(msg.df, 17);
        assert_eq!(msg.address, Some(0x4840D6));
        assert!(matches!(msg.squitter, Some(SquitterMsg::Identification(_))));
    }

    #[test]
    fn test_parse_df4_altitude() {
        let msg = parse(&df4_reply(0x1838, 0x40621D)).unwrap();
        assert_eq!(msg.df, 4);
        assert_eq!(msg.address, None);
        assert_eq!(msg.altitude_ft, Some(38000));
        assert_eq!(msg.squitter, None);
    }

    #[test]
    fn test_parse_rejects_bad_lengths() {
        assert!(parse(&[]).is_none());
        assert!(parse(&[0x8D, 0x48, 0x40]).is_none());
        assert!(parse(&[0u8; 13]).is_none());
    }

    // -- Registry update --

    #[test]
    fn test_decode_message_creates_record() {
        let reg = registry();
        decode_message(&payload(KLM_IDENT), false, &reg, 100.0).unwrap();

        let ac = reg.lookup(0x4840D6).unwrap();
        assert_eq!(ac.callsign.as_deref(), Some("KLM1023 "));
        assert_eq!(ac.last_contact, 100.0);
        assert_eq!(ac.first_seen, 100.0);
        assert_eq!(ac.position, None);
        assert_eq!(ac.altitude_ft, None);
        assert_eq!(ac.message_count, 1);
    }

    #[test]
    fn test_decode_message_cpr_pairing() {
        let reg = registry();

        decode_message(&payload(EVEN_POS), false, &reg, 1.0);
        let ac = reg.lookup(0x40621D).unwrap();
        assert!(ac.position.is_none(), "one frame is not enough");
        assert_eq!(ac.altitude_ft, Some(38000));

        decode_message(&payload(ODD_POS), false, &reg, 2.0);
        let ac = reg.lookup(0x40621D).unwrap();
        let pos = ac.position.expect("even+odd should resolve");
        assert!((pos.lat - 52.26578).abs() < 0.001, "lat {}", pos.lat);
        assert!((pos.lon - 3.93891).abs() < 0.001, "lon {}", pos.lon);
        assert_eq!(ac.last_position, Some(2.0));
        assert!(ac.cpr.is_empty());
    }

    #[test]
    fn test_decode_message_same_parity_no_fix() {
        let reg = registry();
        decode_message(&payload(EVEN_POS), false, &reg, 1.0);
        decode_message(&payload(EVEN_POS), false, &reg, 2.0);
        let ac = reg.lookup(0x40621D).unwrap();
        assert!(ac.position.is_none());
        assert_eq!(ac.last_position, None);
        assert_eq!(ac.message_count, 2);
    }

    #[test]
    fn test_decode_message_surface_frame_does_not_pair_with_airborne() {
        let reg = registry();

        // Even frame retagged as a surface position (TC 6), then an airborne odd frame
        let mut ground = payload(EVEN_POS);
        ground[4] = (6 << 3) | (ground[4] & 0x07);
        decode_message(&ground, false, &reg, 1.0).unwrap();
        decode_message(&payload(ODD_POS), false, &reg, 2.0).unwrap();

        let ac = reg.lookup(0x40621D).unwrap();
        assert_eq!(ac.position, None);
        assert_eq!(ac.last_position, None);
        assert!(matches!(ac.cpr, cpr::CprBuffer::Odd { surface: false, .. }));

        // The next airborne even frame completes the airborne pair
        decode_message(&payload(EVEN_POS), false, &reg, 3.0).unwrap();
        let pos = reg.lookup(0x40621D).unwrap().position.expect("airborne pair");
        assert!((pos.lat - 52.2572).abs() < 0.001, "lat {}", pos.lat);
        assert!((pos.lon - 3.9194).abs() < 0.001, "lon {}", pos.lon);
    }

    #[test]
    fn test_decode_message_zone_mismatch_keeps_old_position() {
        let reg = registry();
        decode_message(&payload(EVEN_POS), false, &reg, 1.0);
        decode_message(&payload(ODD_POS), false, &reg, 2.0);
        let before = reg.lookup(0x40621D).unwrap().position;

        // Frames from either side of a latitude zone boundary
        let mut even = payload(EVEN_POS);
        set_cpr(&mut even, 97649, 51372);
        let mut odd = payload(ODD_POS);
        set_cpr(&mut odd, 94266, 50194);
        decode_message(&even, false, &reg, 3.0);
        decode_message(&odd, false, &reg, 4.0);

        let ac = reg.lookup(0x40621D).unwrap();
        assert_eq!(ac.position, before);
        assert_eq!(ac.last_position, Some(2.0));
        assert!(ac.cpr.is_empty(), "rejected pair still consumes the buffer");
    }

    #[test]
    fn test_decode_message_mlat_flag_tracks_latest() {
        let reg = registry();
        decode_message(&payload(KLM_IDENT), true, &reg, 1.0);
        assert!(reg.lookup(0x4840D6).unwrap().is_mlat);
        decode_message(&payload(KLM_IDENT), false, &reg, 2.0);
        assert!(!reg.lookup(0x4840D6).unwrap().is_mlat);
    }

    #[test]
    fn test_decode_message_unknown_fields_do_not_clobber() {
        let reg = registry();
        decode_message(&payload(KLM_IDENT), false, &reg, 1.0);
        decode_message(&payload(EVEN_POS), false, &reg, 1.0);

        // Identification without callsign
        let mut blank = payload(KLM_IDENT);
        blank[5..11].fill(0);
        decode_message(&blank, false, &reg, 2.0);
        assert_eq!(reg.lookup(0x4840D6).unwrap().callsign.as_deref(), Some("KLM1023 "));

        // Gillham-coded altitude (Q bit clear) leaves the previous value
        let mut gillham = payload(EVEN_POS);
        gillham[5] &= !0x01;
        decode_message(&gillham, false, &reg, 3.0);
        let ac = reg.lookup(0x40621D).unwrap();
        assert_eq!(ac.altitude_ft, Some(38000));
        assert_eq!(ac.last_contact, 3.0);
    }

    #[test]
    fn test_decode_message_df11_creates_record() {
        let reg = registry();
        let msg = decode_message(&[0x5D, 0x48, 0x40, 0xD6, 0x00, 0x00, 0x00], false, &reg, 5.0);
        assert_eq!(msg.unwrap().df, 11);
        assert_eq!(reg.count(), 1);
        assert_eq!(reg.lookup(0x4840D6).unwrap().last_contact, 5.0);
    }

    #[test]
    fn test_decode_message_residual_altitude_for_known_address() {
        let reg = registry();
        decode_message(&payload(EVEN_POS), false, &reg, 1.0);

        decode_message(&df4_reply(0x1838 - 0x0400, 0x40621D), false, &reg, 2.0);
        let ac = reg.lookup(0x40621D).unwrap();
        assert_eq!(ac.altitude_ft, Some(38000 - 25 * 256));
        assert_eq!(ac.last_contact, 2.0);
    }

    #[test]
    fn test_decode_message_residual_never_creates() {
        let reg = registry();
        assert!(decode_message(&df4_reply(0x1838, 0xABCDEF), false, &reg, 1.0).is_none());
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn test_decode_message_garbage_does_not_create() {
        let reg = registry();
        decode_message(&payload(KLM_IDENT), true, &reg, 1.0);
        let mut junk = payload(KLM_IDENT);
        junk[0] = 0x00; // DF0, parity no longer matches a known address
        decode_message(&junk, true, &reg, 2.0);
        decode_message(&[0xFF], true, &reg, 2.0);
        decode_message(&[], true, &reg, 2.0);
        assert_eq!(reg.count(), 1);
    }
}
