//! Periodic display, overhead alerts, statistics and eviction.
//!
//! Every tick takes one registry snapshot and renders it in the selected
//! mode. Every `STATS_INTERVAL` the counters are logged and silent aircraft
//! are evicted.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use comfy_table::{Cell, Table};
use serde::Serialize;
use tracing::{info, warn};

use overhead_core::geo;
use overhead_core::registry::{AircraftRecord, Registry, Staleness};
use overhead_core::types::{Address, Position};

use crate::feed::{unix_now, FrameCounter};
use crate::notification::Notifier;

pub const TICK: Duration = Duration::from_millis(500);
pub const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// A callsign is alerted at most once per this many seconds.
pub const ALERT_WINDOW_SECS: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DisplayMode {
    /// Redraw a table of every interesting aircraft.
    Table,
    /// Alert on aircraft passing within the radius.
    Overhead,
    /// One JSON snapshot per tick on stdout.
    Json,
}

#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub mode: DisplayMode,
    pub radius_miles: f64,
    pub timeout_secs: f64,
}

// ---------------------------------------------------------------------------
// Alert de-duplication
// ---------------------------------------------------------------------------

/// Callsigns alerted recently, with the time of the alert.
#[derive(Debug, Default)]
pub struct AlertedAircraft {
    alerted: HashMap<String, f64>,
}

impl AlertedAircraft {
    pub fn already_alerted(&self, callsign: &str) -> bool {
        self.alerted.contains_key(callsign)
    }

    pub fn add(&mut self, callsign: &str, now: f64) {
        self.alerted.insert(callsign.to_string(), now);
    }

    /// Forget alerts older than the window. Returns count removed.
    pub fn prune(&mut self, now: f64) -> usize {
        let before = self.alerted.len();
        self.alerted.retain(|_, &mut t| now - t <= ALERT_WINDOW_SECS);
        before - self.alerted.len()
    }

    pub fn len(&self) -> usize {
        self.alerted.len()
    }
}

// ---------------------------------------------------------------------------
// Overhead mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub address: Address,
    pub callsign: String,
    pub position: Position,
    pub altitude_ft: i32,
    pub miles: f64,
}

impl Alert {
    pub fn message(&self) -> String {
        format!(
            "https://flightaware.com/live/flight/{cs} {cs} flew {:.2} miles overhead at {} ft!",
            self.miles,
            self.altitude_ft,
            cs = self.callsign,
        )
    }
}

/// Result of one overhead pass over a snapshot.
#[derive(Debug, Default)]
pub struct OverheadPass {
    pub alerts: Vec<Alert>,
    /// Positioned aircraft whose position is too old to show; to be removed.
    pub expired: Vec<Address>,
}

/// Find fresh aircraft inside the radius that have not been alerted yet.
///
/// Only aircraft with both a position and an altitude are considered.
/// Aircraft without a callsign are logged but never alerted.
pub fn overhead_pass(
    snapshot: &[AircraftRecord],
    reference: &Position,
    radius_miles: f64,
    now: f64,
    alerted: &mut AlertedAircraft,
) -> OverheadPass {
    let mut pass = OverheadPass::default();

    for ac in snapshot {
        let (Some(position), Some(altitude_ft)) = (ac.position, ac.altitude_ft) else {
            continue;
        };

        match ac.staleness(now) {
            Staleness::ExtraStale => {
                pass.expired.push(ac.address);
                continue;
            }
            Staleness::Stale => continue,
            Staleness::Fresh => {}
        }

        let miles = geo::meters_to_miles(geo::distance(&position, reference));
        if miles >= radius_miles {
            continue;
        }

        let callsign = ac.callsign.as_deref().map(str::trim).unwrap_or_default();
        if callsign.is_empty() {
            tracing::debug!(address = %ac.hex(), miles, altitude_ft, "overhead without callsign");
            continue;
        }
        if alerted.already_alerted(callsign) {
            continue;
        }

        alerted.add(callsign, now);
        pass.alerts.push(Alert {
            address: ac.address,
            callsign: callsign.to_string(),
            position,
            altitude_ft,
            miles,
        });
    }

    pass
}

// ---------------------------------------------------------------------------
// Table mode
// ---------------------------------------------------------------------------

/// Table of every aircraft with a callsign, position or altitude.
///
/// `^` marks a multilateration fix, `?` a stale position and `…` one too
/// old to trust.
pub fn render_table(snapshot: &[AircraftRecord], reference: &Position, now: f64) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["ICAO", "Callsign", "Location", "Alt (ft)", "Distance (mi)", "Age (s)"]);

    for ac in snapshot {
        if ac.callsign.is_none() && ac.position.is_none() && ac.altitude_ft.is_none() {
            continue;
        }

        let staleness = ac.staleness(now);
        let stale_mark = if staleness == Staleness::Fresh { "" } else { "?" };
        let mlat_mark = if ac.is_mlat { "^" } else { "" };

        let location = match ac.position {
            Some(p) => format!("{:.6},{:.6}", p.lat, p.lon),
            None => "---.------,---.------".to_string(),
        };
        let distance = match ac.distance_from(reference) {
            Some(m) => format!("{:.2}{stale_mark}", geo::meters_to_miles(m)),
            None => "-".to_string(),
        };
        let age = match ac.position_age(now) {
            Some(age) if staleness == Staleness::ExtraStale => format!("{age:.0}…"),
            Some(age) => format!("{age:.0}"),
            None => "-".to_string(),
        };

        table.add_row(vec![
            Cell::new(ac.hex()),
            Cell::new(ac.callsign.as_deref().unwrap_or("-")),
            Cell::new(format!("{location}{mlat_mark}{stale_mark}")),
            Cell::new(ac.altitude_ft.map(|a| a.to_string()).unwrap_or("-----".into())),
            Cell::new(distance),
            Cell::new(age),
        ]);
    }

    table
}

// ---------------------------------------------------------------------------
// JSON mode
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct JsonTick<'a> {
    time: f64,
    count: usize,
    aircraft: &'a [AircraftRecord],
}

pub fn render_json(snapshot: &[AircraftRecord], now: f64) -> serde_json::Result<String> {
    serde_json::to_string(&JsonTick {
        time: now,
        count: snapshot.len(),
        aircraft: snapshot,
    })
}

// ---------------------------------------------------------------------------
// Periodic task
// ---------------------------------------------------------------------------

/// One display tick.
pub fn tick(
    registry: &Registry,
    config: &DisplayConfig,
    notifier: &dyn Notifier,
    alerted: &mut AlertedAircraft,
    now: f64,
) {
    let snapshot = registry.snapshot();

    match config.mode {
        DisplayMode::Table => {
            let table = render_table(&snapshot, registry.reference(), now);
            let mut out = std::io::stdout().lock();
            if let Err(e) = writeln!(out, "\x1b[H\x1b[2J{table}").and_then(|_| out.flush()) {
                warn!(error = %e, "failed to write table");
            }
        }
        DisplayMode::Overhead => {
            let pass = overhead_pass(&snapshot, registry.reference(), config.radius_miles, now, alerted);
            // The notifier owns alert output, the info log included
            for alert in &pass.alerts {
                tracing::debug!(
                    address = %overhead_core::address_to_string(alert.address),
                    lat = alert.position.lat,
                    lon = alert.position.lon,
                    "alert position"
                );
                notifier.notify(&alert.message());
            }
            for address in pass.expired {
                registry.remove(address);
            }
        }
        DisplayMode::Json => match render_json(&snapshot, now) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "failed to serialize snapshot"),
        },
    }

    alerted.prune(now);
}

/// Log counters, then evict aircraft silent for longer than the timeout.
pub fn stats_and_evict(
    registry: &Registry,
    frames: &FrameCounter,
    alerted: &AlertedAircraft,
    timeout_secs: f64,
    now: f64,
) -> usize {
    info!(
        known = registry.count(),
        alerted = alerted.len(),
        frames = frames.get(),
        "stats"
    );
    let evicted = registry.evict_older_than(now, timeout_secs);
    if evicted > 0 {
        info!(evicted, "evicted silent aircraft");
    }
    evicted
}

/// Run the display loop until the process exits.
pub async fn run_display(
    registry: Arc<Registry>,
    frames: Arc<FrameCounter>,
    config: DisplayConfig,
    notifier: Arc<dyn Notifier>,
) {
    let mut ticker = tokio::time::interval(TICK);
    let stats_every = (STATS_INTERVAL.as_millis() / TICK.as_millis()) as u64;
    let mut alerted = AlertedAircraft::default();
    let mut ticks = 0u64;

    loop {
        ticker.tick().await;
        let now = unix_now();
        tick(&registry, &config, notifier.as_ref(), &mut alerted, now);

        ticks += 1;
        if ticks % stats_every == 0 {
            stats_and_evict(&registry, &frames, &alerted, config.timeout_secs, now);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
