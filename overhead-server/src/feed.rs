//! BEAST feed connections.
//!
//! One task per connection reads marker-terminated chunks, reassembles
//! frames and decodes them straight into the shared registry. A connection
//! ending (EOF or read error) ends only its own task.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use overhead_core::beast::{FrameReassembler, FRAME_MARKER, MAX_PENDING};
use overhead_core::decode::decode_message;
use overhead_core::registry::Registry;

/// Pause before the single reconnect attempt in client mode.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// First pause after a failed `accept()`; doubles per consecutive failure.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(5);

/// Wall-clock time as Unix seconds.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Long Mode S frames handed to the decoder, across all connections.
#[derive(Debug, Default)]
pub struct FrameCounter(AtomicU64);

impl FrameCounter {
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Per-connection loop
// ---------------------------------------------------------------------------

/// Consume one BEAST stream until it ends.
///
/// A run of more than `MAX_PENDING` bytes without a marker is discarded as it
/// is read, so a peer that never sends one cannot grow the chunk buffer.
pub async fn run_feed<R>(
    mut reader: R,
    registry: &Registry,
    frames: &FrameCounter,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut reassembler = FrameReassembler::new();
    let mut chunk = Vec::with_capacity(64);

    loop {
        chunk.clear();
        let limit = MAX_PENDING as u64;
        if (&mut reader).take(limit).read_until(FRAME_MARKER, &mut chunk).await? == 0 {
            return Ok(());
        }
        if chunk.len() == MAX_PENDING && chunk.last() != Some(&FRAME_MARKER) {
            tracing::trace!(bytes = chunk.len(), "discarding unterminated input");
            continue;
        }

        let Some(frame) = reassembler.push(&chunk) else {
            continue;
        };
        frames.record();
        decode_message(&frame.payload, frame.is_mlat, registry, unix_now());
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: String,
    registry: Arc<Registry>,
    frames: Arc<FrameCounter>,
) {
    info!(%peer, "feed connected");
    match run_feed(BufReader::new(stream), &registry, &frames).await {
        Ok(()) => info!(%peer, "feed closed"),
        Err(e) => warn!(%peer, error = %e, "feed read failed"),
    }
}

// ---------------------------------------------------------------------------
// Client mode
// ---------------------------------------------------------------------------

/// Dial the feeder, retrying once after a short pause.
pub async fn dial(feeder: &str) -> std::io::Result<TcpStream> {
    match TcpStream::connect(feeder).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            warn!(%feeder, error = %e, "connect failed, retrying once");
            tokio::time::sleep(RETRY_DELAY).await;
            TcpStream::connect(feeder).await
        }
    }
}

/// Dial the feeder and spawn its connection task.
pub async fn connect(
    feeder: &str,
    registry: Arc<Registry>,
    frames: Arc<FrameCounter>,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let stream = dial(feeder).await?;
    let peer = feeder.to_string();
    Ok(tokio::spawn(handle_connection(stream, peer, registry, frames)))
}

// ---------------------------------------------------------------------------
// Server mode
// ---------------------------------------------------------------------------

/// Accept feeders forever, one task each.
pub async fn accept_loop(
    listener: TcpListener,
    registry: Arc<Registry>,
    frames: Arc<FrameCounter>,
) {
    let mut failures = 0u32;
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                failures = 0;
                let peer = addr.to_string();
                tokio::spawn(handle_connection(stream, peer, registry.clone(), frames.clone()));
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let pause = accept_backoff(failures);
                warn!(error = %e, failures, ?pause, "accept failed");
                tokio::time::sleep(pause).await;
            }
        }
    }
}

/// Pause before the next `accept()` after `failures` consecutive errors.
fn accept_backoff(failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(6);
    (ACCEPT_BACKOFF * (1 << shift)).min(MAX_ACCEPT_BACKOFF)
}

/// Bind the listening socket and spawn the accept loop.
pub async fn listen(
    bind: &str,
    registry: Arc<Registry>,
    frames: Arc<FrameCounter>,
) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "listening for BEAST feeders");
    tokio::spawn(accept_loop(listener, registry, frames));
    Ok(addr)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
