//! overhead: watch BEAST feeds and report aircraft passing overhead.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use overhead_core::beast;
use overhead_core::config::{self, Config};
use overhead_core::registry::Registry;
use overhead_core::{OverheadError, Result};

mod display;
mod feed;
mod logging;
mod notification;

use display::{DisplayConfig, DisplayMode};
use feed::FrameCounter;
use notification::{Notifier, Notifiers};

#[derive(Parser)]
#[command(name = "overhead", version, about = "Live aircraft watcher for BEAST feeds")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    opts: SharedOpts,
}

/// Flags shared by every subcommand. Each overrides the config file.
#[derive(Args, Debug, Clone)]
struct SharedOpts {
    /// Receiver latitude, used for distances and surface positions
    #[arg(long, global = true, env = "OVERHEAD_LAT", allow_negative_numbers = true)]
    lat: Option<f64>,

    /// Receiver longitude
    #[arg(long, global = true, env = "OVERHEAD_LON", allow_negative_numbers = true)]
    lon: Option<f64>,

    /// Output mode
    #[arg(long, global = true, env = "OVERHEAD_MODE", value_enum, default_value = "overhead")]
    mode: DisplayMode,

    /// Alert radius in miles
    #[arg(long, global = true, env = "OVERHEAD_RADIUS")]
    radius: Option<f64>,

    /// Seconds of silence before an aircraft is forgotten
    #[arg(long, global = true, env = "OVERHEAD_TIMEOUT")]
    timeout: Option<f64>,

    /// Webhook URL receiving overhead alerts
    #[arg(long, global = true, env = "OVERHEAD_WEBHOOK")]
    webhook: Option<String>,

    /// Write logs to this file (rotated daily) instead of stderr
    #[arg(long, global = true, env = "OVERHEAD_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Dial a BEAST feeder and track its aircraft
    Connect {
        /// host:port of the BEAST feed
        #[arg(long, env = "OVERHEAD_FEEDER", default_value = "192.168.1.50:30005")]
        feeder: String,
    },

    /// Accept BEAST feeders on a listening socket
    Listen {
        /// ip:port to bind
        #[arg(long, env = "OVERHEAD_BIND", default_value = "127.0.0.1:8081")]
        bind: String,
    },

    /// Decode a captured BEAST byte file and print the resulting aircraft
    Replay {
        /// Path to the raw BEAST capture
        file: PathBuf,
    },

    /// Write the effective configuration to ~/.overhead/config.yaml
    Config,
}

impl SharedOpts {
    /// Config file values with command-line overrides applied.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(lat) = self.lat {
            config.receiver.lat = lat;
        }
        if let Some(lon) = self.lon {
            config.receiver.lon = lon;
        }
        if let Some(radius) = self.radius {
            config.alert.radius_miles = radius;
        }
        if let Some(url) = &self.webhook {
            config.alert.webhook = Some(url.clone());
        }
        if let Some(timeout) = self.timeout {
            config.tracking.timeout_secs = timeout;
        }
        config
    }

    fn display_config(&self, config: &Config) -> DisplayConfig {
        DisplayConfig {
            mode: self.mode,
            radius_miles: config.alert.radius_miles,
            timeout_secs: config.tracking.timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let _log_guard = logging::init_logging(cli.opts.log_file.as_deref())?;

    let config = cli.opts.apply(config::load_config()?);
    validate(&config)?;

    match cli.command {
        Commands::Connect { feeder } => cmd_connect(&feeder, &config, &cli.opts).await,
        Commands::Listen { bind } => cmd_listen(&bind, &config, &cli.opts).await,
        Commands::Replay { file } => cmd_replay(&file, &config, &cli.opts),
        Commands::Config => cmd_config(&config),
    }
}

fn validate(config: &Config) -> Result<()> {
    let lat = config.receiver.lat;
    let lon = config.receiver.lon;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(OverheadError::Config(format!(
            "receiver location out of range: {lat},{lon}"
        )));
    }
    if config.tracking.timeout_secs <= 0.0 {
        return Err(OverheadError::Config("timeout must be positive".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Live modes
// ---------------------------------------------------------------------------

struct Live {
    registry: Arc<Registry>,
    frames: Arc<FrameCounter>,
}

impl Live {
    fn new(config: &Config) -> Self {
        info!(
            lat = config.receiver.lat,
            lon = config.receiver.lon,
            radius_miles = config.alert.radius_miles,
            timeout_secs = config.tracking.timeout_secs,
            "starting to watch overhead"
        );
        Live {
            registry: Arc::new(Registry::new(config.reference())),
            frames: Arc::new(FrameCounter::default()),
        }
    }

    /// Run the display loop until Ctrl-C.
    async fn watch(self, config: &Config, opts: &SharedOpts) -> Result<()> {
        let notifier: Arc<dyn Notifier> =
            Arc::new(Notifiers::from_webhook(config.alert.webhook.as_deref()));
        let display = display::run_display(
            self.registry.clone(),
            self.frames.clone(),
            opts.display_config(config),
            notifier,
        );

        tokio::select! {
            _ = display => Ok(()),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!(
                    known = self.registry.count(),
                    frames = self.frames.get(),
                    "shutting down"
                );
                Ok(())
            }
        }
    }
}

async fn cmd_connect(feeder: &str, config: &Config, opts: &SharedOpts) -> Result<()> {
    let live = Live::new(config);
    feed::connect(feeder, live.registry.clone(), live.frames.clone()).await?;
    live.watch(config, opts).await
}

async fn cmd_listen(bind: &str, config: &Config, opts: &SharedOpts) -> Result<()> {
    let live = Live::new(config);
    feed::listen(bind, live.registry.clone(), live.frames.clone()).await?;
    live.watch(config, opts).await
}

// ---------------------------------------------------------------------------
// Offline modes
// ---------------------------------------------------------------------------

fn cmd_replay(file: &Path, config: &Config, opts: &SharedOpts) -> Result<()> {
    let data = std::fs::read(file)?;
    let registry = Registry::new(config.reference());
    let now = feed::unix_now();

    let stats = beast::demux_bytes(&data, &registry, now);
    let snapshot = registry.snapshot();

    if opts.mode == DisplayMode::Json {
        let line = display::render_json(&snapshot, now).map_err(std::io::Error::from)?;
        println!("{line}");
        return Ok(());
    }

    println!();
    println!(
        "Frames: {} extracted, {} decoded, {} aircraft",
        stats.frames,
        stats.decoded,
        registry.count()
    );
    println!();

    if !snapshot.is_empty() {
        println!("{}", display::render_table(&snapshot, registry.reference(), now));
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    let path = config::save_config(config)?;
    println!("Configuration written to {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
