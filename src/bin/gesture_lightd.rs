//! gesture_lightd - Gesture Light daemon
//!
//! This daemon:
//! 1. Loads configuration (TOML file + environment)
//! 2. Loads the gesture classifier (failure aborts startup)
//! 3. Discovers the light over MQTT, or uses an in-memory light with --dry-run
//! 4. Captures frames on a dedicated thread, dropping frames while busy
//! 5. Classifies each frame and dispatches light commands while the light is reachable

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gesture_light::{
    spawn_worker, CameraSource, ClassifierRegistry, DeviceRegistry, FramePipeline, FrameFeeder,
    GestureLightConfig, MqttPlatform, RecordingLight, WorkerOptions,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Control a smart light with hand gestures")]
struct Args {
    /// Path to a TOML config file.
    #[arg(long, env = "GESTURE_LIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Use an in-memory light that is always reachable instead of MQTT.
    #[arg(long)]
    dry_run: bool,

    /// Stop after processing this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = GestureLightConfig::load_from(args.config.as_deref())?;
    cfg.check_run_mode(args.dry_run)?;
    log::info!(
        "gesture_lightd {} starting (camera {}, classifier {}, light '{}')",
        env!("CARGO_PKG_VERSION"),
        cfg.camera.url,
        cfg.classifier.backend,
        cfg.device.name
    );

    // Model load is the only fatal pipeline error.
    let classifier = ClassifierRegistry::with_builtin_backends()
        .load(&cfg.classifier)
        .context("classifier initialization failed")?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            log::info!("shutdown signal received");
            running.store(false, Ordering::SeqCst);
        })
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    }

    let devices = DeviceRegistry::new();
    if args.dry_run {
        let light = RecordingLight::new(&cfg.device.name).with_logging();
        devices.discovered(Arc::new(light), true);
        log::info!("dry run: commands go to an in-memory light");
    } else {
        MqttPlatform::new(&cfg.mqtt, &cfg.device, devices.clone())?.spawn(running.clone())?;
    }

    let mut source = CameraSource::new(&cfg.camera)?;
    source.connect()?;
    let feeder = FrameFeeder::spawn(source, cfg.camera.target_fps, running.clone())?;

    let pipeline = FramePipeline::new(classifier, devices.reader());
    let worker = spawn_worker(
        pipeline,
        feeder.frames(),
        running.clone(),
        Some(feeder.stats()),
        WorkerOptions {
            max_frames: args.max_frames,
            health_interval: cfg.health_interval,
        },
    )?;

    let stats = worker
        .join()
        .map_err(|_| anyhow!("pipeline worker panicked"))?;
    running.store(false, Ordering::SeqCst);
    feeder.stop();

    log::info!(
        "gesture_lightd stopped: {} frames, {} commands dispatched, {} dropped, {} failed",
        stats.frames_processed,
        stats.commands_dispatched,
        stats.commands_dropped,
        stats.commands_failed
    );
    Ok(())
}
