//! tablemark CLI: calibration and tracking of table markers against recorded
//! detector output.

use clap::{Args, Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use tablemark::track::{tracking_transform, Subscription};
use tablemark::{
    calibrate_from_capture, track_recording, CalibrationResult, FanoutBroadcaster, Point2D,
    ReplayCapture, TrackRecording, TrackerConfig,
};

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "tablemark")]
#[command(about = "Projector-camera calibration and marker tracking for interactive tables")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON log lines.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the projected reference grid layout as JSON.
    ReferenceGrid(ConfigArg),

    /// Calibrate from a recorded capture and persist the homographies.
    Calibrate {
        #[command(flatten)]
        config: ConfigArg,
        /// Recorded detector output of a calibration session (JSON).
        #[arg(long)]
        capture: PathBuf,
    },

    /// Replay recorded detections through the tracker, one payload per line.
    Track {
        #[command(flatten)]
        config: ConfigArg,
        /// Recorded per-frame detector output (JSON).
        #[arg(long)]
        recording: PathBuf,
    },

    /// Map one camera pixel through the persisted calibration.
    Map {
        #[command(flatten)]
        config: ConfigArg,
        x: f64,
        y: f64,
    },

    /// Apply the configured undistortion/enhancement to an image file.
    #[cfg(feature = "image")]
    Preprocess {
        #[command(flatten)]
        config: ConfigArg,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct ConfigArg {
    /// Tracker configuration (JSON).
    #[arg(long)]
    config: PathBuf,
}

impl ConfigArg {
    fn load(&self) -> CliResult<(TrackerConfig, PathBuf)> {
        let cfg = TrackerConfig::load_json(&self.config)?;
        cfg.validate()?;
        let base = self
            .config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let dir = cfg.calibration_dir(base);
        Ok((cfg, dir))
    }
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match cli.command {
        Commands::ReferenceGrid(config) => reference_grid(&config),
        Commands::Calibrate { config, capture } => calibrate(&config, &capture),
        Commands::Track { config, recording } => track(&config, &recording),
        Commands::Map { config, x, y } => map_point(&config, x, y),
        #[cfg(feature = "image")]
        Commands::Preprocess {
            config,
            input,
            output,
        } => preprocess(&config, &input, &output),
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) -> CliResult<()> {
    tablemark::core::init_with_level(tablemark::core::level_from_verbosity(cli.verbose))?;
    Ok(())
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) -> CliResult<()> {
    let _ = tracing_log::LogTracer::init();
    if cli.verbose > 0 && std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(tablemark::core::level_from_verbosity(cli.verbose));
    }
    tablemark::core::init_tracing(cli.json_logs);
    Ok(())
}

fn reference_grid(config: &ConfigArg) -> CliResult<()> {
    let (cfg, _) = config.load()?;
    let grid = cfg.reference_grid()?;
    println!("{}", serde_json::to_string_pretty(&grid)?);
    Ok(())
}

fn calibrate(config: &ConfigArg, capture: &Path) -> CliResult<()> {
    let (cfg, dir) = config.load()?;
    let capture = ReplayCapture::load_json(capture)?;
    let result = calibrate_from_capture(&cfg, &capture)?;
    result.save(&dir)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn track(config: &ConfigArg, recording: &Path) -> CliResult<()> {
    let (cfg, dir) = config.load()?;
    let calibration = CalibrationResult::load(&dir)?;
    let recording = TrackRecording::load_json(recording)?;

    let hub = FanoutBroadcaster::new();
    let subscription = hub.subscribe(recording.frames.len().max(1));
    let summary = track_recording(&cfg, &calibration, &recording, hub)?;
    print_payloads(&subscription);
    log::info!(
        "{} frames, {} payloads, exit: {:?}",
        summary.frames,
        summary.published,
        summary.exit
    );
    Ok(())
}

fn print_payloads(subscription: &Subscription) {
    while let Some(line) = subscription.try_recv() {
        println!("{line}");
    }
}

fn map_point(config: &ConfigArg, x: f64, y: f64) -> CliResult<()> {
    let (cfg, dir) = config.load()?;
    let calibration = CalibrationResult::load(&dir)?;
    let h = tracking_transform(&calibration, cfg.tracking.output_space)?;
    let p = h.apply(Point2D::new(x, y))?;
    println!("{} {}", p.x, p.y);
    Ok(())
}

#[cfg(feature = "image")]
fn preprocess(config: &ConfigArg, input: &Path, output: &Path) -> CliResult<()> {
    let (cfg, _) = config.load()?;
    let preprocessor = cfg.build_preprocessor()?;
    tablemark::frames::preprocess_file(&preprocessor, input, output)?;
    Ok(())
}
