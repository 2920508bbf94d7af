//! overhead-core: BEAST framing, Mode S decoding, CPR position resolution and
//! the shared aircraft registry.
//!
//! No async, no sockets. Time is always passed in as Unix seconds. This crate
//! is driven by `overhead-server`, which owns the connections and the display.

pub mod beast;
pub mod config;
pub mod cpr;
pub mod crc;
pub mod decode;
pub mod geo;
pub mod registry;
pub mod types;

// Re-export commonly used types at crate root
pub use beast::{BeastFrame, BeastTimestamp, FrameReassembler};
pub use decode::decode_message;
pub use registry::{AircraftRecord, Registry, Staleness};
pub use types::*;
