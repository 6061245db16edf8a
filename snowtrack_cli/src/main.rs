use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueHint};
use rayon::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use snowtrack::{
    detect_gaps, parse_gpx_samples, replay_samples, FileSessionStore, MetricsConfig,
    SessionStore, SkiSession,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Ski session metrics CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay recorded GPX tracks through the session metrics engine
    Replay(ReplayArgs),
    /// Inspect GPX tracks for sample coverage and timing gaps
    Diagnose(DiagnoseArgs),
}

#[derive(Parser, Debug)]
struct ReplayArgs {
    /// GPX files to replay
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Write the session records as JSON (`-` for stdout)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Append the session records to this JSON session store
    #[arg(long, value_hint = ValueHint::FilePath)]
    store: Option<PathBuf>,

    /// Discard fixes with a reported accuracy radius above this (meters)
    #[arg(long, default_value_t = 30.0)]
    max_accuracy: f64,

    /// Treat device speeds above this as absent (km/h)
    #[arg(long, default_value_t = 120.0)]
    max_speed: f64,

    /// Minimum interval between accepted fixes (seconds)
    #[arg(long, default_value_t = 0.2)]
    min_dt: f64,

    /// Sliding median window over observed speeds (forced odd)
    #[arg(long, default_value_t = 5)]
    median_window: usize,

    /// Low-pass smoothing coefficient, higher is smoother
    #[arg(long, default_value_t = 0.80)]
    alpha: f64,

    /// Relative device/geometric speed difference treated as inconsistent
    #[arg(long, default_value_t = 0.35)]
    tolerance: f64,

    /// Per-step distance clamp multiplier
    #[arg(long, default_value_t = 1.5)]
    overshoot: f64,

    /// Smoothed speed below which no distance accrues (km/h)
    #[arg(long, default_value_t = 0.8)]
    min_speed: f64,

    /// Altitude change below which descent counts as noise (meters)
    #[arg(long, default_value_t = 2.0)]
    min_vertical: f64,
}

#[derive(Parser, Debug)]
struct DiagnoseArgs {
    /// GPX files to inspect
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Report inter-sample gaps longer than this (seconds)
    #[arg(long, default_value_t = 60.0)]
    gap_sec: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Replay(args) => run_replay(args),
        Command::Diagnose(args) => run_diagnose(args),
    }
}

fn metrics_config(args: &ReplayArgs) -> MetricsConfig {
    MetricsConfig {
        max_horizontal_accuracy_m: args.max_accuracy,
        max_speed_kmh: args.max_speed,
        min_dt_sec: args.min_dt,
        median_window: args.median_window,
        low_pass_alpha: args.alpha,
        consistency_tolerance: args.tolerance,
        clamp_overshoot_ratio: args.overshoot,
        min_speed_for_distance_kmh: args.min_speed,
        min_vertical_change_m: args.min_vertical,
    }
}

fn run_replay(args: ReplayArgs) -> Result<()> {
    let config = metrics_config(&args);

    let results: Vec<(PathBuf, Result<SkiSession>)> = args
        .inputs
        .par_iter()
        .map(|path| (path.clone(), replay_file(path, config)))
        .collect();

    let mut sessions = Vec::new();
    for (path, result) in results {
        match result {
            Ok(session) => {
                info!(
                    "{}: {:.2} km in {} (top {:.1} km/h, avg {:.1} km/h, drop {} m)",
                    path.display(),
                    session.distance_km,
                    session.formatted_duration(),
                    session.top_speed_kmh,
                    session.avg_speed_kmh,
                    session.vertical_drop_m
                );
                sessions.push(session);
            }
            Err(err) => warn!("{}: {err:#}", path.display()),
        }
    }

    if sessions.is_empty() {
        bail!("no input produced a session");
    }

    if let Some(store_path) = &args.store {
        let mut store = FileSessionStore::new(store_path);
        for session in &sessions {
            store
                .save_session(session)
                .context("appending to session store")?;
        }
        info!(
            "appended {} session(s) to {}",
            sessions.len(),
            store_path.display()
        );
    }

    if let Some(output) = &args.output {
        let json = serde_json::to_string_pretty(&sessions)?;
        if output.as_os_str() == "-" {
            let mut stdout = io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        } else {
            fs::write(output, json)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("wrote {}", output.display());
        }
    }

    Ok(())
}

fn replay_file(path: &Path, config: MetricsConfig) -> Result<SkiSession> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let samples =
        parse_gpx_samples(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    replay_samples(&samples, config).with_context(|| format!("replaying {}", path.display()))
}

fn run_diagnose(args: DiagnoseArgs) -> Result<()> {
    for path in &args.inputs {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let samples =
            parse_gpx_samples(&bytes).with_context(|| format!("parsing {}", path.display()))?;

        let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
            warn!("{}: no timestamped track points", path.display());
            continue;
        };
        let span_sec = last.timestamp_ms.saturating_sub(first.timestamp_ms) / 1000;
        let missing_altitude = samples.iter().filter(|s| s.altitude_m.is_none()).count();
        let missing_speed = samples.iter().filter(|s| s.speed_mps.is_none()).count();
        let gaps = detect_gaps(&samples, args.gap_sec);

        println!("{}", path.display());
        println!("  samples:          {}", samples.len());
        println!("  span:             {} s", span_sec);
        println!("  missing altitude: {}", missing_altitude);
        println!("  missing speed:    {}", missing_speed);
        println!("  gaps > {:.0} s:       {}", args.gap_sec, gaps.len());
        for gap in &gaps {
            let offset_sec = gap.start_ms.saturating_sub(first.timestamp_ms) as f64 / 1000.0;
            println!(
                "    {:.1} s gap starting {:.0} s into the track",
                gap.duration_sec, offset_sec
            );
        }
    }
    Ok(())
}
