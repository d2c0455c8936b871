// THEORY:
// `frame_tester` is the bench harness for the `insect_vision` engine. It stands in for
// the camera side of a trap: captures come from image files, crops go to PNG files,
// and the terminal shows what the detector saw.
//
// `detect` runs one cycle on one capture. `watch` runs the same cycle the way the
// trap firmware does: a periodic trigger is raised in the background and the main loop
// polls it, taking the next capture from a directory whenever the flag was raised.

mod console;
mod io;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use insect_vision::core_modules::frame::Frame;
use insect_vision::core_modules::location_extractor::{self, LocationSummary};
use insect_vision::core_modules::preprocessor;
use insect_vision::core_modules::trigger::{self, DetectionTrigger};
use insect_vision::{Detector, PipelineConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Parser, Debug)]
#[command(name = "frame_tester", version, about = "Runs insect detection cycles on image files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one detection cycle on a single capture.
    Detect {
        /// Current capture (color or grayscale image).
        #[arg(long)]
        frame: PathBuf,
        /// Background reference of the same size.
        #[arg(long)]
        background: PathBuf,
        #[command(flatten)]
        options: CycleOptions,
    },
    /// Poll a directory of captures, one detection cycle per trigger tick.
    Watch {
        /// Directory holding the captures, processed in name order.
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        background: PathBuf,
        /// Trigger period in milliseconds.
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
        /// Stop after this many cycles (default: once every capture was processed).
        #[arg(long)]
        max_cycles: Option<usize>,
        #[command(flatten)]
        options: CycleOptions,
    },
    /// Print the default configuration as JSON.
    DumpConfig,
}

#[derive(clap::Args, Debug, Clone, Default)]
struct CycleOptions {
    /// JSON config file; omitted fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory the crops are written to.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Draw the capture, the mask and every crop on the terminal.
    #[arg(long, default_value_t = false)]
    preview: bool,
}

/// What one cycle produced, for the summary line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CycleSummary {
    clusters: usize,
    /// Extent of every surviving location, before clustering.
    locations: Option<LocationSummary>,
    crops_written: Vec<PathBuf>,
    crops_skipped: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "insect_vision=info,frame_tester=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Detect {
            frame,
            background,
            options,
        } => {
            let background = io::load_gray(&background)?;
            let summary = run_capture(&frame, &background, &options)?;
            println!(
                "{}: {} clusters, {} crops written, {} skipped",
                frame.display(),
                summary.clusters,
                summary.crops_written.len(),
                summary.crops_skipped
            );
        }
        Command::Watch {
            dir,
            background,
            interval_ms,
            max_cycles,
            options,
        } => {
            let background = io::load_gray(&background)?;
            let cycles = watch(
                &dir,
                &background,
                Duration::from_millis(interval_ms),
                max_cycles,
                &options,
            )
            .await?;
            println!("watch finished after {cycles} cycles");
        }
        Command::DumpConfig => {
            println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
        }
    }
    Ok(())
}

/// Loads `capture`, runs one full cycle against `background` and saves the crops.
fn run_capture(capture: &Path, background: &Frame, options: &CycleOptions) -> Result<CycleSummary> {
    let (gray, rgb) = io::load_capture(capture)?;
    let config = io::load_config(options.config.as_deref(), gray.width, gray.height)?;
    let detector = Detector::new(config).context("invalid detector configuration")?;
    let (report, batch) = detector
        .detect_and_crop(&gray, background, &rgb)
        .with_context(|| format!("detection failed on {}", capture.display()))?;

    let locations = location_extractor::summarize_locations(report.locations.as_slice());
    if let Some(summary) = &locations {
        info!(
            count = summary.count,
            center = ?summary.mass_center,
            bounds = ?summary.bounding_box,
            "locations"
        );
    }
    let (centers, boxes) = report.clusters.to_sentinel_arrays();
    for (i, cluster) in report.clusters.iter().enumerate() {
        info!(
            cluster = i,
            center = ?centers[i],
            bounds = ?boxes[i],
            members = cluster.member_count,
            "final cluster"
        );
    }
    for skipped in &batch.skipped {
        warn!(cluster = skipped.region.cluster_index, error = %skipped.error, "crop not saved");
    }

    if options.preview {
        preview(&detector, &gray, background, &rgb, &batch)?;
    }

    let crops_written = match &options.out {
        Some(dir) => io::save_crops(&batch, dir, &io::file_stem(capture))?,
        None => Vec::new(),
    };
    Ok(CycleSummary {
        clusters: report.clusters.len(),
        locations,
        crops_written,
        crops_skipped: batch.skipped.len(),
    })
}

fn preview(
    detector: &Detector,
    gray: &Frame,
    background: &Frame,
    rgb: &Frame,
    batch: &insect_vision::CropBatch,
) -> Result<()> {
    let config = detector.config();
    let diff = preprocessor::background_subtract(gray, background, config.subtraction)?;
    let mask = preprocessor::binarize(&diff, config.threshold_value, config.polarity)?;

    println!("capture:\n{}", console::render(rgb)?);
    println!("mask:\n{}", console::render_mask(&mask)?);
    for crop in &batch.crops {
        println!("crop {}:\n{}", crop.region.cluster_index, console::render(&crop.image)?);
    }
    Ok(())
}

/// Runs one cycle per raised trigger until the captures (or `max_cycles`) run out.
async fn watch(
    dir: &Path,
    background: &Frame,
    period: Duration,
    max_cycles: Option<usize>,
    options: &CycleOptions,
) -> Result<usize> {
    let captures = io::list_captures(dir)?;
    let limit = max_cycles.unwrap_or(captures.len()).min(captures.len());
    info!(dir = %dir.display(), captures = captures.len(), limit, "watching");

    let flag = DetectionTrigger::new();
    let ticker = trigger::spawn_periodic(flag.clone(), period)?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cycles = 0;
    while cycles < limit {
        if !flag.take() {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("interrupted");
                    break;
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => continue,
            }
        }

        let capture = &captures[cycles];
        match run_capture(capture, background, options) {
            Ok(summary) => info!(
                capture = %capture.display(),
                clusters = summary.clusters,
                crops = summary.crops_written.len(),
                "cycle done"
            ),
            // One bad capture does not stop the loop.
            Err(error) => warn!(capture = %capture.display(), error = ?error, "cycle failed"),
        }
        cycles += 1;
    }
    ticker.abort();
    Ok(cycles)
}
