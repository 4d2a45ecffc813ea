//! gesturemote: hand-gesture command dispatch engine.
//!
//! Consumes per-frame hand-landmark observations from a pluggable
//! source, classifies them, and emits debounced command events to
//! notification sinks.

mod classifier;
mod engine;
mod landmark;
mod rules;
mod runtime;
mod sink;
mod source;
mod zones;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use classifier::{GestureClassifier, MotionConfig, MotionDirection};
use engine::DispatchEngine;
use rules::CommandRuleTable;
use sink::{LogSink, NotificationSink, SocketSink};
use source::{LandmarkSource, ReplaySource, SyntheticSource};
use zones::{PointingZoneTable, ZoneBand};

#[derive(Parser, Debug)]
#[command(name = "gesturemote", about = "Hand-gesture command dispatch engine")]
struct Cli {
    /// Frame source: synthetic or replay
    #[arg(long, default_value = "synthetic")]
    source: String,

    /// Replay file (s-expression frames, one per line)
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Tick interval for the synthetic source (seconds)
    #[arg(long, default_value_t = 0.1)]
    tick_interval: f64,

    /// Emit synthetic frames as fast as possible (no real-time pacing)
    #[arg(long, default_value_t = false)]
    no_pace: bool,

    /// Bind the Unix-socket notification sink
    #[arg(long, default_value_t = false)]
    socket: bool,

    /// Notification socket path (default: $XDG_RUNTIME_DIR/gesturemote.sock)
    #[arg(long)]
    socket_path: Option<PathBuf>,

    /// Log every broadcast payload
    #[arg(long, default_value_t = false)]
    trace_events: bool,

    /// Minimum net displacement for lateral-motion detection
    #[arg(long, default_value_t = 0.1)]
    movement_threshold: f32,

    /// Samples in the lateral-motion window
    #[arg(long, default_value_t = 5)]
    consecutive_samples: usize,

    /// Minimum interval between motion samples (seconds)
    #[arg(long, default_value_t = 0.1)]
    sample_interval: f64,

    /// Direction a swipe must travel: left or right
    #[arg(long, default_value = "right")]
    swipe_direction: String,

    /// Pointing zone band as "DEG:NAME" (repeatable, descending upper
    /// boundaries; replaces the standard table)
    #[arg(long = "zone-band", value_name = "DEG:NAME", allow_hyphen_values = true)]
    zone_bands: Vec<String>,

    /// Inclusive lower bound of the last zone band (degrees)
    #[arg(long, default_value_t = -120.0, allow_hyphen_values = true)]
    zone_floor: f32,

    /// Exit after N seconds
    #[arg(long)]
    exit_after: Option<u64>,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("gesturemote {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gesturemote=info".into()),
        )
        .init();

    info!("gesturemote v{} starting", env!("CARGO_PKG_VERSION"));

    let direction = match MotionDirection::from_str(&cli.swipe_direction) {
        Some(d) => d,
        None => {
            eprintln!(
                "Unknown swipe direction: {}. Use: left or right",
                cli.swipe_direction
            );
            std::process::exit(1);
        }
    };

    let motion = MotionConfig {
        movement_threshold: cli.movement_threshold,
        consecutive_samples: cli.consecutive_samples,
        sample_interval_s: cli.sample_interval,
        direction,
    };

    let mut source: Box<dyn LandmarkSource> = match cli.source.as_str() {
        "synthetic" => {
            info!("source: synthetic tour ({}s ticks)", cli.tick_interval);
            Box::new(SyntheticSource::standard(cli.tick_interval, !cli.no_pace))
        }
        "replay" => {
            let Some(ref path) = cli.replay else {
                eprintln!("--source replay requires --replay <file>");
                std::process::exit(1);
            };
            Box::new(ReplaySource::open(path)?)
        }
        other => {
            eprintln!("Unknown source: {}. Use: synthetic or replay", other);
            std::process::exit(1);
        }
    };

    let mut sinks: Vec<Box<dyn NotificationSink>> = vec![Box::new(LogSink)];
    if cli.socket {
        let path = cli
            .socket_path
            .unwrap_or_else(SocketSink::default_socket_path);
        let mut socket_sink = SocketSink::bind(&path)?;
        socket_sink.trace_events = cli.trace_events;
        sinks.push(Box::new(socket_sink));
    }

    let zones = if cli.zone_bands.is_empty() {
        PointingZoneTable::standard()
    } else {
        let mut bands = Vec::new();
        for entry in &cli.zone_bands {
            let Some((deg, name)) = entry.split_once(':') else {
                eprintln!("Invalid zone band: {}. Use: DEG:NAME", entry);
                std::process::exit(1);
            };
            let Ok(deg) = deg.trim().parse::<f32>() else {
                eprintln!("Invalid zone boundary in: {}", entry);
                std::process::exit(1);
            };
            bands.push(ZoneBand::new(deg, name.trim()));
        }
        PointingZoneTable::new(bands, cli.zone_floor)?
    };

    let rules = CommandRuleTable::standard();
    info!(rules = rules.len(), zones = zones.len(), "engine configured");

    let mut engine = DispatchEngine::new(GestureClassifier::new(motion), rules, zones);

    runtime::install_signal_handlers();

    let exit_after = cli.exit_after.map(Duration::from_secs);
    let stats = runtime::run_loop(&mut engine, source.as_mut(), &mut sinks, exit_after)?;

    info!(
        frames = stats.frames,
        commands = stats.commands,
        transitions = stats.transitions,
        "gesturemote exiting"
    );
    Ok(())
}
