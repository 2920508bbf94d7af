//! Concurrent aircraft registry keyed by transponder address.
//!
//! Pure logic, no I/O. Records are copied in and out whole: callers read a
//! record with [`Registry::lookup`], mutate the copy, and write it back with
//! [`Registry::upsert`]. Nothing hands out references into the map, so a
//! reader never observes a half-updated record.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::cpr::CprBuffer;
use crate::geo;
use crate::types::*;

/// Aircraft considered gone after this many seconds of silence.
pub const DEFAULT_TIMEOUT_SECS: f64 = 60.0;

/// Position older than this is displayed as stale.
pub const STALE_POSITION_SECS: f64 = 10.0;

/// Position older than this is no longer shown at all.
pub const EXTRA_STALE_POSITION_SECS: f64 = 20.0;

// ---------------------------------------------------------------------------
// Aircraft record
// ---------------------------------------------------------------------------

/// How old the last resolved position is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Staleness {
    Fresh,
    Stale,
    ExtraStale,
}

/// Everything known about one aircraft.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftRecord {
    #[serde(serialize_with = "serialize_address")]
    pub address: Address,
    pub callsign: Option<String>,
    pub position: Option<Position>,
    pub altitude_ft: Option<i32>,

    /// Unpaired CPR frame waiting for its opposite parity.
    #[serde(skip)]
    pub cpr: CprBuffer,

    pub first_seen: f64,
    pub last_contact: f64,
    pub last_position: Option<f64>,
    pub message_count: u64,
    /// Whether the most recent update came from a multilateration source.
    pub is_mlat: bool,
}

fn serialize_address<S: serde::Serializer>(
    address: &Address,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&address_to_string(*address))
}

impl AircraftRecord {
    pub fn new(address: Address, now: f64) -> Self {
        AircraftRecord {
            address,
            callsign: None,
            position: None,
            altitude_ft: None,
            cpr: CprBuffer::default(),
            first_seen: now,
            last_contact: now,
            last_position: None,
            message_count: 0,
            is_mlat: false,
        }
    }

    pub fn hex(&self) -> String {
        address_to_string(self.address)
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    /// Seconds since any message was attributed to this aircraft.
    pub fn age(&self, now: f64) -> f64 {
        now - self.last_contact
    }

    /// Seconds since the last resolved position, if there ever was one.
    pub fn position_age(&self, now: f64) -> Option<f64> {
        self.last_position.map(|t| now - t)
    }

    /// Never-positioned records count as extra stale.
    pub fn staleness(&self, now: f64) -> Staleness {
        match self.position_age(now) {
            Some(age) if age > EXTRA_STALE_POSITION_SECS => Staleness::ExtraStale,
            Some(age) if age > STALE_POSITION_SECS => Staleness::Stale,
            Some(_) => Staleness::Fresh,
            None => Staleness::ExtraStale,
        }
    }

    /// Distance to `reference` in metres, when the position is known.
    pub fn distance_from(&self, reference: &Position) -> Option<f64> {
        self.position.as_ref().map(|p| geo::distance(p, reference))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Address-keyed store shared by every feed task and the display loop.
///
/// The reference point (receiver location) orders snapshots and anchors
/// surface position decoding.
#[derive(Debug)]
pub struct Registry {
    aircraft: RwLock<HashMap<Address, AircraftRecord>>,
    reference: Position,
}

impl Registry {
    pub fn new(reference: Position) -> Self {
        Registry {
            aircraft: RwLock::new(HashMap::new()),
            reference,
        }
    }

    pub fn reference(&self) -> &Position {
        &self.reference
    }

    // A panic while holding the lock cannot leave a record half-written
    // (records are replaced whole), so a poisoned map is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Address, AircraftRecord>> {
        self.aircraft.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Address, AircraftRecord>> {
        self.aircraft.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the record stored under `record.address`.
    pub fn upsert(&self, record: AircraftRecord) {
        self.write().insert(record.address, record);
    }

    /// Copy of the record for `address`.
    pub fn lookup(&self, address: Address) -> Option<AircraftRecord> {
        self.read().get(&address).cloned()
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    pub fn remove(&self, address: Address) -> Option<AircraftRecord> {
        self.write().remove(&address)
    }

    /// Copies of every record in display order.
    ///
    /// Positioned aircraft first, nearest to the reference point first, then
    /// aircraft without a position. Ties break on callsign (absent last) and
    /// finally on the hex address, so the order is total.
    pub fn snapshot(&self) -> Vec<AircraftRecord> {
        let mut records: Vec<AircraftRecord> = self.read().values().cloned().collect();
        records.sort_by(|a, b| display_order(a, b, &self.reference));
        records
    }

    /// Drop every record silent for longer than `timeout_secs`. Returns count removed.
    ///
    /// Age is checked under the write lock, so a record refreshed by a feed
    /// task just before eviction survives.
    pub fn evict_older_than(&self, now: f64, timeout_secs: f64) -> usize {
        let mut aircraft = self.write();
        let before = aircraft.len();
        aircraft.retain(|_, ac| ac.age(now) <= timeout_secs);
        before - aircraft.len()
    }
}

fn display_order(a: &AircraftRecord, b: &AircraftRecord, reference: &Position) -> Ordering {
    let by_distance = match (a.distance_from(reference), b.distance_from(reference)) {
        (Some(da), Some(db)) => da.total_cmp(&db),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    let by_callsign = match (&a.callsign, &b.callsign) {
        (Some(ca), Some(cb)) => ca.cmp(cb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    by_distance
        .then(by_callsign)
        .then_with(|| a.hex().cmp(&b.hex()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
