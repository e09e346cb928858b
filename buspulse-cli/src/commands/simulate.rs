//! Simulate command - drive a bus toward a stop and track it live.
//!
//! Runs both halves of the pipeline in one process: a simulated driver
//! publishes fixes into the channel while a rider tracks the same bus and
//! prints each update with its arrival estimate.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use buspulse::app::{AppConfig, BusPulseApp};
use buspulse::config::ConfigFile;
use buspulse::geo::{distance_m, GeoPoint};
use buspulse::logging::{default_log_dir, init_logging, DEFAULT_LOG_FILE};
use buspulse::source::{RouteSimulator, RouteSimulatorConfig};
use buspulse::subscriber::{TrackingSnapshot, TrackingStatus};
use clap::Args;
use console::style;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::CliError;

/// A bus within this many meters of the stop has arrived.
const ARRIVAL_RADIUS_M: f64 = 15.0;

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Bus identifier to publish under
    #[arg(long, default_value = "42")]
    pub bus: String,

    /// Start point as LAT,LON
    #[arg(long, allow_hyphen_values = true, default_value = "40.758000,-73.985500")]
    pub from: GeoPoint,

    /// Stop the rider is waiting at, as LAT,LON
    #[arg(long, allow_hyphen_values = true, default_value = "40.752700,-73.977200")]
    pub to: GeoPoint,

    /// Ground speed in meters per second
    #[arg(long, default_value_t = 10.0)]
    pub speed: f64,

    /// Milliseconds between fixes
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// Give up after this many seconds
    #[arg(long)]
    pub stop_after_secs: Option<u64>,

    /// Print one JSON snapshot per line
    #[arg(long)]
    pub json: bool,
}

/// Why the tracking loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Arrived,
    TimedOut,
    Interrupted,
    Ended,
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    if !args.speed.is_finite() || args.speed <= 0.0 {
        return Err(CliError::InvalidArgument(format!(
            "--speed must be positive, got {}",
            args.speed
        )));
    }
    if args.interval_ms == 0 {
        return Err(CliError::InvalidArgument(
            "--interval-ms must be at least 1".to_string(),
        ));
    }

    let _logging = init_logging(&default_log_dir(), DEFAULT_LOG_FILE)
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    let config = AppConfig::from_config_file(&ConfigFile::load()?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let cancellation = CancellationToken::new();
    let on_signal = cancellation.clone();
    ctrlc::set_handler(move || {
        on_signal.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    runtime.block_on(simulate(args, config, cancellation))
}

async fn simulate(
    args: SimulateArgs,
    config: AppConfig,
    cancellation: CancellationToken,
) -> Result<(), CliError> {
    let app = BusPulseApp::start(config)?;

    let simulator = RouteSimulator::new(
        RouteSimulatorConfig::new(args.from, args.to)
            .with_speed(args.speed)
            .with_interval(Duration::from_millis(args.interval_ms)),
    );
    let publisher = app.publisher(Arc::new(simulator));
    let bus_id = publisher.set_bus_id(&args.bus)?;
    publisher.start()?;
    info!(bus = %bus_id, from = %args.from, to = %args.to, "Simulated trip started");

    if !args.json {
        println!(
            "Tracking bus {} from {} to {} at {:.1} m/s",
            style(&bus_id).bold(),
            args.from,
            args.to,
            args.speed
        );
        println!("Press Ctrl+C to stop");
        println!();
    }

    let mut handle = app.track(bus_id.as_str(), Some(args.to))?;
    let mut snapshots = handle.watch_snapshot();

    let deadline = args
        .stop_after_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let expired = async move {
        match deadline {
            Some(at) => sleep_until(at).await,
            None => future::pending::<()>().await,
        }
    };
    tokio::pin!(expired);

    let mut last_printed: Option<(TrackingStatus, Option<i64>)> = None;
    let outcome = loop {
        tokio::select! {
            biased;

            _ = cancellation.cancelled() => break Outcome::Interrupted,

            _ = &mut expired => break Outcome::TimedOut,

            changed = snapshots.changed() => {
                if changed.is_err() {
                    break Outcome::Ended;
                }
                let snapshot = snapshots.borrow_and_update().clone();

                let key = (
                    snapshot.status,
                    snapshot.latest.map(|p| p.captured_at().timestamp_millis()),
                );
                if last_printed != Some(key) {
                    last_printed = Some(key);
                    print_snapshot(&snapshot, args.json);
                }

                if has_arrived(&snapshot, &args.to) {
                    break Outcome::Arrived;
                }
            }
        }
    };

    let final_snapshot = handle.stop().await;
    let summary = publisher.stop();
    app.shutdown().await;
    info!(bus = %bus_id, ?outcome, "Simulated trip finished");

    if args.json {
        return Ok(());
    }

    println!();
    match outcome {
        Outcome::Arrived => println!("{}", style("Bus arrived at the stop").green().bold()),
        Outcome::TimedOut => println!("{}", style("Stopped: time limit reached").yellow()),
        Outcome::Interrupted => println!("{}", style("Stopped: interrupted").yellow()),
        Outcome::Ended => println!("{}", style("Stopped: tracking ended").yellow()),
    }
    println!("Positions received: {}", final_snapshot.history.len());
    if let Some(summary) = summary {
        println!("{}", summary);
    }
    Ok(())
}

fn print_snapshot(snapshot: &TrackingSnapshot, json: bool) {
    if json {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize snapshot"),
        }
        return;
    }

    let status = match snapshot.status {
        TrackingStatus::Live => style(snapshot.status.to_string()).green(),
        TrackingStatus::Stale => style(snapshot.status.to_string()).yellow(),
        TrackingStatus::Connecting | TrackingStatus::Stopped => {
            style(snapshot.status.to_string()).dim()
        }
    };
    println!("{:<10} {}", status, render_line(snapshot));
}

/// One line describing where the bus is and when it will arrive.
fn render_line(snapshot: &TrackingSnapshot) -> String {
    let position = match &snapshot.latest {
        Some(p) => p.point().to_string(),
        None => "waiting for first fix".to_string(),
    };
    match &snapshot.eta {
        Some(eta) => format!("{}  ETA {}", position, eta),
        None => position,
    }
}

fn has_arrived(snapshot: &TrackingSnapshot, stop: &GeoPoint) -> bool {
    snapshot
        .latest
        .map(|p| distance_m(&p.point(), stop) <= ARRIVAL_RADIUS_M)
        .unwrap_or(false)
}
