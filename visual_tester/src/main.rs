use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ember_vision::{
    CommandAlarm, Detector, FireConfig, FirePipeline, FrameReport, FrameSource, ImageDirSource,
    LogNotifier, NoDetector, Notifier, SnapshotNotifier, StreamPipeline, run_poll_loop,
};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "visual_tester")]
#[command(about = "Runs the fire pipeline over still images or a frame directory", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML file overriding the default tunables
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// YOLOv8 ONNX model for the detector cross-check (needs the `yolo` feature)
    #[arg(long, short, global = true)]
    model: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide a single still image
    Analyze {
        image: PathBuf,

        /// Where to write the annotated image
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Replay a directory of frames as a live stream
    Watch {
        frames: PathBuf,

        /// Directory for annotated frames
        #[arg(long, short)]
        out: PathBuf,

        /// Save a JPEG snapshot per notification instead of only logging it
        #[arg(long)]
        snapshots: Option<PathBuf>,

        /// Player command for the audible alarm, e.g. "aplay assets/alarm.wav"
        #[arg(long)]
        alarm_command: Option<String>,

        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<usize>,

        /// Drive the pipeline from an async worker instead of the poll loop
        #[arg(long)]
        stream: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ember_vision=info,visual_tester=info")),
        )
        .init();

    let cli = Cli::parse();

    // --- 1. Configuration ---
    let config = match &cli.config {
        Some(path) => FireConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FireConfig::default(),
    };

    // --- 2. Detector ---
    let detector = load_detector(cli.model.as_deref())?;

    match cli.command {
        Commands::Analyze { image, out } => analyze(config, detector, &image, out.as_deref()),
        Commands::Watch {
            frames,
            out,
            snapshots,
            alarm_command,
            max_frames,
            stream,
        } => {
            std::fs::create_dir_all(&out)
                .with_context(|| format!("creating output directory {}", out.display()))?;
            let notifier: Box<dyn Notifier> = match snapshots {
                Some(dir) => Box::new(SnapshotNotifier::new(dir)?),
                None => Box::new(LogNotifier),
            };
            let mut pipeline = FirePipeline::new(config, detector, notifier)?;
            if let Some(line) = alarm_command {
                let Some(alarm) = CommandAlarm::from_command_line(&line) else {
                    bail!("--alarm-command must name a program");
                };
                pipeline = pipeline.with_alarm(Box::new(alarm));
            }
            let mut source = ImageDirSource::open(&frames)?;
            info!("Replaying {} frames from {}", source.remaining(), frames.display());

            if stream {
                watch_stream(pipeline, &mut source, &out, max_frames).await
            } else {
                watch_poll(pipeline, &mut source, &out, max_frames)
            }
        }
    }
}

#[cfg(feature = "yolo")]
fn load_detector(model: Option<&Path>) -> Result<Box<dyn Detector>> {
    Ok(match model {
        Some(path) => Box::new(ember_vision::YoloDetector::load(path)?),
        None => Box::new(NoDetector),
    })
}

#[cfg(not(feature = "yolo"))]
fn load_detector(model: Option<&Path>) -> Result<Box<dyn Detector>> {
    if let Some(path) = model {
        bail!(
            "cannot load {}: visual_tester was built without the `yolo` feature",
            path.display()
        );
    }
    Ok(Box::new(NoDetector))
}

fn analyze(
    config: FireConfig,
    detector: Box<dyn Detector>,
    image: &Path,
    out: Option<&Path>,
) -> Result<()> {
    let frame = image::open(image)
        .with_context(|| format!("reading {}", image.display()))?
        .to_rgb8();
    let mut pipeline = FirePipeline::new(config, detector, Box::new(LogNotifier))?;
    let analysis = pipeline.analyze_image(frame);

    println!(
        "{}: fire={} color-motion={} detector={} candidates={}",
        image.display(),
        analysis.fire_detected,
        analysis.color_motion_fire,
        analysis.yolo_fire,
        analysis.candidates.accepted().count()
    );

    if let Some(out) = out {
        analysis.annotated.image.save(out)?;
        info!("Annotated image saved to {}", out.display());
    }
    Ok(())
}

fn watch_poll(
    mut pipeline: FirePipeline,
    source: &mut dyn FrameSource,
    out: &Path,
    max_frames: Option<usize>,
) -> Result<()> {
    let processed = run_poll_loop(source, &mut pipeline, max_frames, |report| {
        write_report(out, report)
    })?;
    println!(
        "Processing complete. {} frames, final alert {}. Output saved to {}",
        processed,
        pipeline.alert_state(),
        out.display()
    );
    Ok(())
}

async fn watch_stream(
    pipeline: FirePipeline,
    source: &mut dyn FrameSource,
    out: &Path,
    max_frames: Option<usize>,
) -> Result<()> {
    let stream = StreamPipeline::spawn(pipeline);
    let mut reports = stream.subscribe_reports();

    let writer_out = out.to_path_buf();
    let writer = tokio::spawn(async move {
        loop {
            match reports.recv().await {
                Ok(report) => write_report(&writer_out, &report),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Frame writer fell behind, skipped {} reports", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Queued frames are written even when the source fails part way.
    let fed = stream.drain_source(source, max_frames).await;
    writer.await?;
    let (submitted, pipeline) = fed?;
    println!(
        "Processing complete. {} frames, final alert {}. Output saved to {}",
        submitted,
        pipeline.alert_state(),
        out.display()
    );
    Ok(())
}

fn write_report(out: &Path, report: &FrameReport) {
    if let Some(transition) = report.transition {
        println!("frame {:06}: alert {:?}", report.frame_id(), transition);
    }
    let path = out.join(format!("frame_{:06}.png", report.frame_id()));
    if let Err(err) = report.analysis.annotated.image.save(&path) {
        warn!("Could not write {}: {}", path.display(), err);
    }
}
