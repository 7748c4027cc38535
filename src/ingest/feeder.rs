//! Capture thread that delivers frames to the pipeline worker.
//!
//! The hand-off channel holds a single frame. When the worker is still busy
//! the waiting frame is replaced by the newest one and the stale frame is
//! dropped here, at the source. The pipeline never queues frames, never
//! classifies a frame older than the latest capture, and capture never waits
//! on classification.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use super::camera::CameraSource;
use crate::frame::Frame;

const CAPTURE_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Counters shared between the capture thread and its owner.
#[derive(Debug, Default)]
pub struct FeederStats {
    pub delivered: AtomicU64,
    pub dropped: AtomicU64,
    pub capture_errors: AtomicU64,
}

/// Running capture thread plus the receiving end of its hand-off channel.
pub struct FrameFeeder {
    frames: Receiver<Frame>,
    stats: Arc<FeederStats>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FrameFeeder {
    /// Start capturing from a connected source at up to `target_fps`.
    ///
    /// The thread runs until `running` is cleared.
    pub fn spawn(
        mut source: CameraSource,
        target_fps: u32,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let (tx, rx) = bounded::<Frame>(1);
        let stats = Arc::new(FeederStats::default());
        let frame_interval = Duration::from_secs_f64(1.0 / target_fps.max(1) as f64);

        let stale = rx.clone();
        let thread_stats = stats.clone();
        let thread_running = running.clone();
        let handle = thread::Builder::new()
            .name("frame-capture".to_string())
            .spawn(move || {
                log::info!("capture thread started ({} fps)", target_fps);
                while thread_running.load(Ordering::SeqCst) {
                    let start = Instant::now();
                    match source.next_frame() {
                        Ok(frame) => {
                            if !hand_off(&tx, &stale, frame, &thread_stats) {
                                log::info!("pipeline worker gone; stopping capture");
                                break;
                            }
                        }
                        Err(e) => {
                            thread_stats.capture_errors.fetch_add(1, Ordering::Relaxed);
                            log::warn!("frame capture failed: {:#}", e);
                            thread::sleep(CAPTURE_ERROR_BACKOFF);
                            continue;
                        }
                    }

                    let elapsed = start.elapsed();
                    if elapsed < frame_interval {
                        thread::sleep(frame_interval - elapsed);
                    }
                }
                let camera = source.stats();
                log::info!(
                    "capture thread stopped after {} frames from {}",
                    camera.frames_captured,
                    camera.url
                );
            })
            .context("failed to spawn capture thread")?;

        Ok(Self {
            frames: rx,
            stats,
            running,
            handle: Some(handle),
        })
    }

    /// Receiving end for the pipeline worker.
    pub fn frames(&self) -> Receiver<Frame> {
        self.frames.clone()
    }

    pub fn stats(&self) -> Arc<FeederStats> {
        self.stats.clone()
    }

    /// Stop capturing and wait for the thread to exit.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("capture thread panicked");
            }
        }
    }
}

/// Offer `frame` to the worker, replacing a frame it has not picked up yet.
///
/// Returns false once the channel is disconnected.
fn hand_off(
    tx: &Sender<Frame>,
    stale: &Receiver<Frame>,
    frame: Frame,
    stats: &FeederStats,
) -> bool {
    let frame = match tx.try_send(frame) {
        Ok(()) => {
            stats.delivered.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        Err(TrySendError::Disconnected(_)) => return false,
        Err(TrySendError::Full(frame)) => frame,
    };
    if let Ok(old) = stale.try_recv() {
        stats.dropped.fetch_add(1, Ordering::Relaxed);
        log::debug!("dropped frame {} (worker busy)", old.sequence);
    }
    match tx.try_send(frame) {
        Ok(()) => {
            stats.delivered.fetch_add(1, Ordering::Relaxed);
            true
        }
        Err(TrySendError::Full(frame)) => {
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            log::debug!("dropped frame {} (worker busy)", frame.sequence);
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}
