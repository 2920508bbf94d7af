//! CRC-24 parity for Mode S messages.
//!
//! ICAO standard polynomial: x^24 + x^23 + x^22 + ... + x^10 + x^3 + 1
//! Generator: 0xFFF409
//!
//! For DF17/18 (ADS-B): last 24 bits are pure CRC. Valid frames → remainder 0.
//! For DF0/4/16/20: last 24 bits are CRC XOR'd with the transponder address,
//! so the remainder of an undamaged reply *is* the address.

use crate::types::Address;

const GENERATOR: u32 = 0xFFF409;

// ---------------------------------------------------------------------------
// CRC lookup table (compile-time)
// ---------------------------------------------------------------------------

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut bit = 0;
        while bit < 8 {
            if crc & 0x800000 != 0 {
                crc = (crc << 1) ^ GENERATOR;
            } else {
                crc <<= 1;
            }
            crc &= 0xFFFFFF;
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = build_crc_table();

// ---------------------------------------------------------------------------
// Core CRC functions
// ---------------------------------------------------------------------------

fn crc24_raw(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &byte in data {
        crc = ((crc << 8) ^ CRC_TABLE[((crc >> 16) ^ byte as u32) as usize & 0xFF]) & 0xFFFFFF;
    }
    crc
}

/// Mode S CRC-24 remainder.
///
/// Polynomial division of the first (n-3) bytes, then XOR with the last 3
/// bytes (parity field).
pub fn crc24(data: &[u8]) -> u32 {
    if data.len() <= 3 {
        return 0;
    }
    let payload_len = data.len() - 3;
    let parity = (data[payload_len] as u32) << 16
        | (data[payload_len + 1] as u32) << 8
        | data[payload_len + 2] as u32;
    crc24_raw(&data[..payload_len]) ^ parity
}

/// CRC-24 of the payload bytes only (all except the last 3).
pub fn crc24_payload(data: &[u8]) -> u32 {
    if data.len() <= 3 {
        return 0;
    }
    crc24_raw(&data[..data.len() - 3])
}

/// Address carried in the parity field of a DF0/4/16/20 reply.
///
/// Noise also produces a remainder, so the result is only trustworthy once
/// the address has been seen explicitly in a DF11/17/18 frame.
pub fn residual_address(payload: &[u8]) -> Option<Address> {
    if payload.len() != 7 && payload.len() != 14 {
        return None;
    }
    Some(crc24(payload))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
