//! sorterd - waste-sorter bridge daemon
//!
//! This daemon:
//! 1. Ingests frames from the conveyor camera (stub:// or HTTP MJPEG)
//! 2. Runs the detector on each frame
//! 3. Maps detection labels to actuator signals via the signal table
//! 4. Gates dispatches through the shared rate limiter
//! 5. POSTs admitted signals to the sorting actuator
//!
//! Dispatch failures are contained per iteration; the perception loop keeps
//! running regardless of actuator health.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sorter_bridge::{
    config::SorterdConfig, Bridge, CameraConfig, CameraSource, Detector, DispatchGate, Dispatcher,
    DryRunDispatcher, HttpDispatcher, StubDetector,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Bridge camera detections to the waste-sorting actuator")]
struct Args {
    /// Path to the JSON config file.
    #[arg(long, env = "SORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Log each would-be dispatch instead of contacting the actuator.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = SorterdConfig::load_from(args.config.as_deref())?;

    log::info!("sorterd starting");
    log::info!("  actuator: {} (max {} req/s)", cfg.actuator.url, cfg.actuator.max_rps);
    log::info!("  camera: {} @ {} fps", cfg.camera.url, cfg.camera.target_fps);
    log::info!("  signal table: {} labels", cfg.signals.len());
    if cfg.min_confidence > 0.0 {
        log::info!("  confidence floor: {:.2}", cfg.min_confidence);
    }

    let camera_config = CameraConfig {
        url: cfg.camera.url.clone(),
        target_fps: cfg.camera.target_fps,
        width: cfg.camera.width,
        height: cfg.camera.height,
        frame_limit: None,
    };
    let mut source = CameraSource::new(camera_config)?;
    source.connect().context("connect camera source")?;

    let mut detector = StubDetector::new();
    for label in cfg.signals.missing_labels(detector.labels()) {
        log::warn!(
            "detector label {:?} has no signal table entry; its detections will be skipped",
            label
        );
    }

    let dispatcher: Box<dyn Dispatcher> = if args.dry_run {
        log::info!("dry-run: dispatches will be logged, not sent");
        Box::new(DryRunDispatcher::new())
    } else {
        Box::new(HttpDispatcher::new(
            &cfg.actuator.url,
            cfg.actuator.request_id.clone(),
            cfg.actuator.timeout,
        ))
    };

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    ctrlc::set_handler(move || {
        stop_handler.store(true, Ordering::Relaxed);
    })
    .context("install shutdown handler")?;

    let gate = DispatchGate::new(cfg.actuator.min_interval());
    let mut bridge =
        Bridge::new(cfg.signals.clone(), gate, dispatcher).with_min_confidence(cfg.min_confidence);

    bridge.run(&mut source, &mut detector, &stop)
}
