//! OffcutsCam: virtual camera CLI.

use anyhow::{Context, Result};
use clap::Parser;
use offcuts_cam::bridge::{NotificationCenter, NotificationName};
use offcuts_cam::config::CameraConfig;
use offcuts_cam::device::ClientInfo;
use offcuts_cam::frame::Frame;
use offcuts_cam::output::{
    FrameObserver, ObserverOutput, OutputBackend, OutputMode, SinkOutput, StreamSink, TimedSample,
};
use offcuts_cam::pixel::mirror_horizontal;
use offcuts_cam::provider::Provider;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Virtual camera that streams one of two still images.
#[derive(Parser, Debug)]
#[command(name = "offcuts-cam")]
#[command(about = "Stream a clear or obstructed still image as a virtual camera")]
struct Args {
    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output mode, overrides the config
    #[arg(long, value_enum)]
    output: Option<OutputMode>,

    /// Directory holding the clear and obstructed images
    #[arg(long)]
    assets: Option<PathBuf>,

    /// v4l2loopback device to write frames to in sink mode (Linux)
    #[arg(long)]
    device: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Where observer mode writes PNG snapshots
    #[arg(long, default_value = "snapshots")]
    snapshot_dir: PathBuf,

    /// Signal file used for cross-process notifications
    #[arg(long)]
    signal_file: Option<PathBuf>,

    /// Tell a running camera to change its active image, then exit
    #[arg(long)]
    toggle: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = load_config(&args)?;

    if args.toggle {
        config.signal_file().broadcast(NotificationName::ChangeImage)?;
        return Ok(());
    }

    info!("Starting OffcutsCam...");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    let output = match config.output.mode {
        OutputMode::Sink => build_sink_output(&config)?,
        OutputMode::Observer => build_observer_output(&config, &args.snapshot_dir)?,
    };

    let center = NotificationCenter::new();
    let provider = Provider::new(&config, output, center.clone())?;
    let _listener = match config.signal_file().listen(center) {
        Ok(listener) => Some(listener),
        Err(e) => {
            warn!("Cross-process notifications unavailable: {:#}", e);
            None
        }
    };

    let client = ClientInfo::new(u64::from(std::process::id())).with_process_name("offcuts-cam");
    provider.connect(client.clone());
    let device = provider.device();
    if !device.authorized_to_start_stream(&client) {
        anyhow::bail!("client {} is not authorized to stream", client.id);
    }
    device.start_stream();

    let stats = device.stats();
    while running.load(Ordering::SeqCst) {
        if args.frames.is_some_and(|limit| stats.delivered() >= limit) {
            info!("Delivered {} frames, stopping", stats.delivered());
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }

    device.stop_stream();
    provider.disconnect(client.id);
    info!(
        "Stream stopped: {} delivered, {} dropped, {} skipped",
        stats.delivered(),
        stats.dropped(),
        stats.skipped()
    );
    Ok(())
}

/// Loads the config file, if any, and applies CLI overrides.
fn load_config(args: &Args) -> Result<CameraConfig> {
    let mut config = match &args.config {
        Some(path) => CameraConfig::load(path)?,
        None => CameraConfig::default(),
    };

    if let Some(mode) = args.output {
        config.output.mode = mode;
    }
    if let Some(assets) = &args.assets {
        config.assets.directory = assets.clone();
    }
    if let Some(device) = &args.device {
        config.output.loopback_device = Some(device.clone());
    }
    if let Some(signal_file) = &args.signal_file {
        config.signal_file = Some(signal_file.clone());
    }

    config.validate()?;
    Ok(config)
}

fn build_sink_output(config: &CameraConfig) -> Result<Box<dyn OutputBackend>> {
    let sink: Box<dyn StreamSink> = match &config.output.loopback_device {
        #[cfg(target_os = "linux")]
        Some(path) => {
            use offcuts_cam::output::{V4l2LoopbackConfig, V4l2LoopbackSink};
            let mut loopback = V4l2LoopbackConfig::new(config.format());
            loopback.device = path.clone();
            Box::new(V4l2LoopbackSink::new(loopback)?)
        }
        #[cfg(not(target_os = "linux"))]
        Some(path) => {
            warn!("Loopback device {} is only supported on Linux, logging samples instead", path.display());
            Box::new(LogSink)
        }
        None => Box::new(LogSink),
    };
    Ok(Box::new(SinkOutput::new(sink, config.format())))
}

/// Sink that only logs the samples it receives.
struct LogSink;

impl StreamSink for LogSink {
    fn send(&mut self, sample: &TimedSample<'_>) -> Result<()> {
        info!(
            "Frame {} ({} image) at {}",
            sample.frame.sequence(),
            sample.frame.state(),
            sample.frame.presentation_time()
        );
        Ok(())
    }
}

fn build_observer_output(config: &CameraConfig, snapshot_dir: &Path) -> Result<Box<dyn OutputBackend>> {
    fs::create_dir_all(snapshot_dir).with_context(|| format!("creating {}", snapshot_dir.display()))?;
    info!("Writing snapshots to {}", snapshot_dir.display());

    let observer = FrameObserver::new();
    let dir = snapshot_dir.to_path_buf();
    observer.set(move |frame| {
        if let Err(e) = write_snapshot(&dir, &frame) {
            error!("Snapshot of frame {} failed: {:#}", frame.sequence(), e);
        }
    });

    Ok(Box::new(ObserverOutput::new(observer, config.output.observer_queue_depth)?))
}

/// Saves a frame as PNG the way a viewer would show it, i.e. un-mirrored.
fn write_snapshot(dir: &Path, frame: &Frame) -> Result<()> {
    let mut image = frame
        .to_rgba_image()
        .context("frame buffer does not match its format")?;
    mirror_horizontal(&mut image);

    let path = dir.join(format!(
        "{}-{}-{:05}.png",
        frame.state(),
        frame.presentation_time().as_nanos(),
        frame.sequence()
    ));
    image.save(&path).with_context(|| format!("saving {}", path.display()))?;
    debug!("Wrote {}", path.display());
    Ok(())
}
