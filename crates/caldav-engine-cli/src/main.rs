//! `caldav-cmd` -- run caldav-engine poll cycles from the command line.
//!
//! The binary plays the host's part: it reads the calendar document, keeps the
//! active windows in a JSON state file between runs, and prints fired commands
//! one per line on stdout. Logs go to stderr (`RUST_LOG`, or `-v`).
//!
//! ## Usage
//!
//! ```sh
//! # Show the per-room timelines the next cycle would schedule
//! caldav-cmd timeline -i calendar.ics
//!
//! # Run one cycle, persisting pending entries in state.json
//! caldav-cmd fire -i calendar.ics --state state.json
//!
//! # Pin the clock and the local offset
//! caldav-cmd --utc-offset +13:00 fire -i calendar.ics --state state.json --now 2017-02-06T03:03:00Z
//!
//! # Poll every 5 minutes (or whatever the config file says)
//! caldav-cmd --config caldav.toml watch -i calendar.ics --state state.json
//! ```

use anyhow::{Context, Result};
use caldav_engine::cycle::build_cycle_timelines;
use caldav_engine::error::EngineError;
use caldav_engine::{ActiveWindows, CalendarSource, EngineConfig, FiredCommand, Poller};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "caldav-cmd",
    version,
    about = "Turn calendar command windows into device commands"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    settings: Settings,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Engine settings; flags override values from `--config`.
#[derive(Args)]
struct Settings {
    /// TOML file with engine settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fixed UTC offset for floating calendar times, e.g. +13:00
    #[arg(long, global = true, allow_hyphen_values = true)]
    utc_offset: Option<String>,

    /// IANA timezone used to derive the offset, e.g. Pacific/Auckland
    #[arg(long, global = true)]
    timezone: Option<String>,

    /// Hours ahead of now to schedule (24 or 48 are typical)
    #[arg(long, global = true)]
    lookahead_hours: Option<u32>,

    /// Milliseconds between cycles in watch mode
    #[arg(long, global = true)]
    interval_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the per-room timelines built from a calendar document as JSON
    Timeline {
        /// Calendar file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Evaluate at this RFC 3339 instant instead of the current time
        #[arg(long, value_parser = parse_now)]
        now: Option<DateTime<Utc>>,
    },
    /// Run one cycle and print the commands that are due
    Fire {
        /// Calendar file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// JSON file holding the active windows between runs
        #[arg(short, long)]
        state: PathBuf,
        /// Evaluate at this RFC 3339 instant instead of the current time
        #[arg(long, value_parser = parse_now)]
        now: Option<DateTime<Utc>>,
    },
    /// Run cycles periodically until interrupted
    Watch {
        /// Calendar file, re-read every cycle
        #[arg(short, long)]
        input: String,
        /// JSON file holding the active windows between runs
        #[arg(short, long)]
        state: PathBuf,
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },
}

/// Reads the calendar document for each cycle.
struct FileSource {
    path: Option<String>,
}

impl CalendarSource for FileSource {
    fn fetch(&mut self) -> caldav_engine::error::Result<String> {
        read_input(self.path.as_deref()).map_err(|e| EngineError::SourceFetch(format!("{:#}", e)))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(&cli.settings)?;

    match cli.command {
        Commands::Timeline { input, now } => {
            let body = read_input(input.as_deref())?;
            let now = now.unwrap_or_else(Utc::now);
            let (timelines, _) = build_cycle_timelines(&body, now, &config)
                .context("Failed to build timelines")?;
            let json = serde_json::to_string_pretty(&timelines)?;
            println!("{}", json);
        }
        Commands::Fire { input, state, now } => {
            let mut poller = Poller::with_state(config, load_state(&state)?);
            let mut source = FileSource { path: input };
            let now = now.unwrap_or_else(Utc::now);
            let fired = poller.poll(&mut source, now).context("Cycle failed")?;
            save_state(&state, poller.active())?;
            print_fired(&fired)?;
        }
        Commands::Watch {
            input,
            state,
            cycles,
        } => {
            let interval = config.poll_interval();
            let interval_ms = config.poll_interval_ms;
            let mut poller = Poller::with_state(config, load_state(&state)?);
            let mut source = FileSource { path: Some(input) };
            let mut completed = 0u64;
            info!(interval_ms, "watching calendar");

            loop {
                match poller.poll(&mut source, Utc::now()) {
                    Ok(fired) => {
                        if let Err(e) = save_state(&state, poller.active()) {
                            error!(
                                error = %format!("{:#}", e),
                                "failed to persist active windows; retrying next interval"
                            );
                        }
                        print_fired(&fired)?;
                    }
                    Err(e) => error!(error = %e, "cycle failed; retrying next interval"),
                }
                completed += 1;
                if cycles.is_some_and(|limit| completed >= limit) {
                    break;
                }
                std::thread::sleep(interval);
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();
}

/// Start from the config file (if any), then apply flag overrides.
fn load_config(settings: &Settings) -> Result<EngineConfig> {
    let mut config = match &settings.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            toml::from_str::<EngineConfig>(&text)
                .with_context(|| format!("Invalid config: {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    if let Some(offset) = &settings.utc_offset {
        config.utc_offset = Some(offset.clone());
    }
    if let Some(zone) = &settings.timezone {
        config.timezone = Some(zone.clone());
    }
    if let Some(hours) = settings.lookahead_hours {
        config.lookahead_hours = hours;
    }
    if let Some(ms) = settings.interval_ms {
        config.poll_interval_ms = ms;
    }
    Ok(config)
}

fn parse_now(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

/// A missing state file means a first run.
fn load_state(path: &Path) -> Result<ActiveWindows> {
    if !path.exists() {
        return Ok(ActiveWindows::new());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state: {}", path.display()))?;
    ActiveWindows::from_json(&json)
        .with_context(|| format!("Failed to parse state: {}", path.display()))
}

/// Write to a sibling temp file, then rename over the old state.
fn save_state(path: &Path, active: &ActiveWindows) -> Result<()> {
    let json = active.to_json()?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .with_context(|| format!("Failed to write state: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace state: {}", path.display()))?;
    Ok(())
}

fn print_fired(fired: &[FiredCommand]) -> Result<()> {
    let mut out = io::stdout().lock();
    for command in fired {
        writeln!(out, "{}", command)?;
    }
    out.flush()?;
    Ok(())
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}
