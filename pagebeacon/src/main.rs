//! pagebeacon - CLI for sending telemetry events through the batching pipeline
//!
//! This tool provides commands for:
//! - Checking tracker configuration
//! - Sending individual custom events and conversions
//! - Replaying recorded events from a JSON Lines file
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/pagebeacon/config.toml (~/.config/pagebeacon/config.toml)
//! - Logs: $XDG_STATE_HOME/pagebeacon/pagebeacon.log (~/.local/state/pagebeacon/pagebeacon.log)

use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pagebeacon_core::logging::{self, LogSinks};
use pagebeacon_core::{Config, DispatchStats, Tracker, TrackerConfig};
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "pagebeacon")]
#[command(about = "Send telemetry events to an ingestion endpoint")]
#[command(version)]
struct Args {
    /// Path to config file (default: XDG config location)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the ingestion endpoint (also enables the tracker)
    #[arg(long)]
    endpoint: Option<String>,

    /// Override the site id
    #[arg(long)]
    site_id: Option<String>,

    /// Override the batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Log every payload and acknowledgment to stderr
    #[arg(long)]
    debug: bool,

    /// Write logs to the XDG state directory
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show tracker configuration and status
    Status,

    /// Send one custom event
    Track {
        /// Event name
        name: String,

        /// Event data as a JSON object
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Send one conversion
    Convert {
        /// Goal name
        goal: String,
    },

    /// Send every event in a JSON Lines file of {"name": .., "data": {..}}
    Replay {
        /// Path to the .jsonl file
        file: PathBuf,
    },
}

/// One line of a replay file
#[derive(Debug, Deserialize)]
struct ReplayEvent {
    name: String,
    #[serde(default)]
    data: serde_json::Value,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };
    apply_overrides(&mut config.tracker, &args);

    let sinks = LogSinks {
        file: args.verbose,
        debug: config.tracker.debug,
    };
    let _log_guard = if sinks.file || sinks.debug {
        Some(logging::init(&config.logging, sinks).context("failed to initialize logging")?)
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config.tracker),
        Command::Track { ref name, ref data } => {
            let data: serde_json::Value = match data {
                Some(raw) => serde_json::from_str(raw).context("--data must be valid JSON")?,
                None => serde_json::Value::Null,
            };
            with_tracker(&config.tracker, |tracker| {
                tracker.track_event(name, data);
                Ok(1)
            })
        }
        Command::Convert { ref goal } => with_tracker(&config.tracker, |tracker| {
            tracker.track_conversion(goal);
            Ok(1)
        }),
        Command::Replay { ref file } => {
            let events = read_replay_file(file)?;
            with_tracker(&config.tracker, |tracker| {
                for event in &events {
                    tracker.track_event(&event.name, event.data.clone());
                }
                Ok(events.len())
            })
        }
    }
}

fn apply_overrides(tracker: &mut TrackerConfig, args: &Args) {
    if let Some(endpoint) = &args.endpoint {
        tracker.endpoint_url = Some(endpoint.clone());
        tracker.enabled = true;
    }
    if let Some(site_id) = &args.site_id {
        tracker.site_id = site_id.clone();
    }
    if let Some(batch_size) = args.batch_size {
        tracker.batch_size = batch_size;
    }
    if args.debug {
        tracker.debug = true;
    }
}

fn cmd_status(tracker: &TrackerConfig) -> Result<()> {
    println!("pagebeacon Tracker Configuration");
    println!("================================");
    println!();

    println!("Enabled:         {}", tracker.enabled);

    if !tracker.enabled {
        println!();
        println!("Tracker is disabled. Enable it in config.toml:");
        println!();
        println!("  [tracker]");
        println!("  enabled = true");
        println!("  endpoint_url = \"https://ingest.example.com/collect\"");
        println!("  site_id = \"your-site-id\"");
        return Ok(());
    }

    println!(
        "Endpoint:        {}",
        tracker.endpoint_url.as_deref().unwrap_or("<not set>")
    );
    println!(
        "Site ID:         {}",
        if tracker.site_id.is_empty() {
            "<not set>"
        } else {
            tracker.site_id.as_str()
        }
    );
    println!("Batch Size:      {}", tracker.batch_size);
    println!("Batch Timeout:   {}ms", tracker.batch_timeout_ms);
    match tracker.max_wait_ms {
        Some(ms) => println!("Max Wait:        {}ms", ms),
        None => println!("Max Wait:        <unbounded>"),
    }
    println!("Timeout:         {}s", tracker.timeout_secs);
    println!("Debug:           {}", tracker.debug);

    println!();
    match tracker.validate() {
        Ok(()) if tracker.is_ready() => println!("Status: Ready to send"),
        Ok(()) => println!("Status: Not ready (missing required configuration)"),
        Err(e) => println!("Status: Not ready ({})", e),
    }

    Ok(())
}

/// Run `f` against a fresh tracker, then flush and wait for every delivery
fn with_tracker<F>(config: &TrackerConfig, f: F) -> Result<()>
where
    F: FnOnce(&Tracker) -> Result<usize>,
{
    if !config.is_ready() {
        println!("Tracker is not configured. Run 'status' for details.");
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;

    runtime.block_on(async {
        let tracker = Tracker::init(config.clone()).context("failed to initialize tracker")?;
        let tracked = f(&tracker)?;
        let stats = tracker.shutdown().await;
        print_summary(tracked, &stats);
        Ok::<(), anyhow::Error>(())
    })
}

fn print_summary(tracked: usize, stats: &DispatchStats) {
    println!("Tracked {} event(s)", tracked);
    println!();
    println!("Stats:");
    println!("  Attempted:  {}", stats.attempted);
    println!("  Delivered:  {}", stats.delivered);
    println!("  Failed:     {}", stats.failed);
}

fn read_replay_file(path: &Path) -> Result<Vec<ReplayEvent>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open replay file {}", path.display()))?;

    let mut events = Vec::new();
    for (index, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ReplayEvent = serde_json::from_str(&line)
            .with_context(|| format!("invalid replay event on line {}", index + 1))?;
        events.push(event);
    }

    tracing::debug!(count = events.len(), path = %path.display(), "Loaded replay file");
    Ok(events)
}
