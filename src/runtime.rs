//! The dispatch loop: sequential frame consumption with cooperative
//! shutdown.
//!
//! One loop owns the engine, pulls frames in arrival order, and fans
//! emitted events out to the sinks.  Frame acquisition failure is fatal
//! and propagates to the caller; everything else is absorbed locally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{error, info};

use crate::engine::DispatchEngine;
use crate::sink::NotificationSink;
use crate::source::LandmarkSource;

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
pub fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Interval between status log lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Counters reported by a finished loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub commands: u64,
    pub transitions: u64,
}

/// Run the dispatch loop until the source ends, a shutdown signal
/// arrives, the optional exit timer fires, or acquisition fails.
///
/// Events are delivered to every sink in emission order; sinks are
/// fire-and-forget and cannot stall or abort the loop.
pub fn run_loop(
    engine: &mut DispatchEngine,
    source: &mut dyn LandmarkSource,
    sinks: &mut [Box<dyn NotificationSink>],
    exit_after: Option<Duration>,
) -> Result<LoopStats> {
    let start_time = Instant::now();
    let mut last_status_log = Instant::now();
    let mut stats = LoopStats::default();

    info!("dispatch loop started");

    loop {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("shutdown signal received, exiting");
            break;
        }

        if let Some(limit) = exit_after {
            if start_time.elapsed() >= limit {
                info!("exit timer fired after {}s", limit.as_secs());
                break;
            }
        }

        if last_status_log.elapsed() >= STATUS_INTERVAL {
            info!(
                frames = stats.frames,
                commands = stats.commands,
                transitions = stats.transitions,
                pointing_zone = engine.state().pointing_zone.as_deref().unwrap_or("none"),
                "dispatch status"
            );
            last_status_log = Instant::now();
        }

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("frame source ended");
                break;
            }
            Err(e) => {
                error!("unable to read frame: {:#}", e);
                return Err(e);
            }
        };

        stats.frames += 1;
        let timestamp = frame.timestamp_s;
        for event in engine.tick(&frame, timestamp) {
            if event.pointing_transition {
                stats.transitions += 1;
            } else {
                stats.commands += 1;
            }
            for sink in sinks.iter_mut() {
                sink.deliver(&event);
            }
        }
    }

    info!(
        frames = stats.frames,
        commands = stats.commands,
        transitions = stats.transitions,
        "dispatch loop shutting down"
    );
    Ok(stats)
}

// ── Tests ──────────────────────────────────────────────────
