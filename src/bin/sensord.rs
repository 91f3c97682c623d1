//! sensord - camera sensor daemon
//!
//! This daemon:
//! 1. Loads the sensor configuration (JSON file, environment, then flags)
//! 2. Starts acquisition from the configured camera
//! 3. Logs motion transitions, faces, errors and a periodic frame count
//! 4. Shuts the sensor down on Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use camera_sensor::{ErrorKind, Sensor, SensorConfig, SourceDescriptor};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a motion-detecting camera sensor")]
struct Args {
    /// Path to a JSON configuration file.
    #[arg(long, env = "SENSOR_CONFIG")]
    config: Option<PathBuf>,

    /// Remote MJPEG stream URL (overrides the configured source).
    #[arg(long, conflicts_with = "local_index")]
    url: Option<String>,

    /// Login for the remote stream.
    #[arg(long, requires = "url")]
    login: Option<String>,

    /// Password for the remote stream.
    #[arg(long, requires = "url")]
    password: Option<String>,

    /// Local camera index (overrides the configured source).
    #[arg(long)]
    local_index: Option<usize>,

    /// Target frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// Exit after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    run_secs: Option<u64>,

    /// Seconds between frame count reports.
    #[arg(long, default_value_t = 10)]
    stats_interval: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = SensorConfig::load_from(args.config.as_deref())?;
    if let Some(url) = args.url.clone() {
        config.source = SourceDescriptor::remote(
            url,
            args.login.clone().unwrap_or_default(),
            args.password.clone().unwrap_or_default(),
        );
    } else if let Some(index) = args.local_index {
        config.source = SourceDescriptor::local(index);
    }
    if let Some(fps) = args.fps {
        config.capture.target_fps = fps;
    }

    let in_motion = Arc::new(AtomicBool::new(false));
    let motion_state = in_motion.clone();
    let sensor = Sensor::builder(config.source.clone())
        .capture(config.capture.clone())
        .on_motion(move |detected| {
            if motion_state.swap(detected, Ordering::Relaxed) != detected {
                if detected {
                    log::info!("motion detected");
                } else {
                    log::info!("motion ended");
                }
            }
        })
        .on_face(|region| log::info!("face at {:?}", region))
        .on_error(|err| {
            if err.kind() != ErrorKind::Closed {
                log::error!("sensor error: {}", err);
            }
        })
        .build();

    sensor.start().context("failed to start sensor")?;
    log::info!(
        "sensord running at {} fps target ({}x{})",
        config.capture.target_fps,
        config.capture.width,
        config.capture.height
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    let deadline = args
        .run_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let stats_interval = Duration::from_secs(args.stats_interval.max(1));
    let mut last_frames = 0u64;

    loop {
        let wait = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    log::info!("run time elapsed");
                    break;
                }
                remaining.min(stats_interval)
            }
            None => stats_interval,
        };
        match rx.recv_timeout(wait) {
            Ok(()) => {
                log::info!("shutdown signal received, stopping sensor...");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let stats = sensor.stats();
        log::info!(
            "state={:?} frames={} (+{}) motion_frames={} faces={} errors={}",
            sensor.state(),
            stats.frames,
            stats.frames - last_frames,
            stats.motion_frames,
            stats.faces,
            stats.errors
        );
        last_frames = stats.frames;
    }

    sensor.shutdown();
    Ok(())
}
