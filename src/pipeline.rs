//! Per-frame processing: classify, interpret, dispatch.
//!
//! `FramePipeline::deliver` drives one frame through the classifier and the
//! gesture interpreter, then dispatches the resulting commands when the light
//! is present and reachable. Otherwise the frame is still classified but its
//! commands are dropped.
//!
//! The pipeline holds no frames. A frame arriving while the previous one is
//! being classified is dropped by the `FrameFeeder`, never queued here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::detect::{Classifier, Detection};
use crate::device::{DeviceStateReader, Presence};
use crate::frame::Frame;
use crate::gesture::{Command, GestureInterpreter};
use crate::ingest::FeederStats;

const RECV_POLL: Duration = Duration::from_millis(100);

/// What happened to one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameOutcome {
    pub sequence: u64,
    pub detections: Vec<Detection>,
    /// Commands derived from the detections, in detection order.
    pub commands: Vec<Command>,
    /// Commands accepted by the device handle.
    pub dispatched: usize,
    /// Commands discarded because the light was absent or unreachable.
    pub dropped: usize,
    /// Commands the device handle rejected.
    pub failed: usize,
    /// Set when classification failed; the frame then has no detections.
    pub classify_error: Option<String>,
}

/// Running totals across frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_processed: u64,
    /// Frames the feeder discarded while the worker was busy.
    pub frames_dropped: u64,
    pub classify_errors: u64,
    pub detections: u64,
    pub commands_dispatched: u64,
    pub commands_dropped: u64,
    pub commands_failed: u64,
}

impl PipelineStats {
    fn record(&mut self, outcome: &FrameOutcome) {
        self.frames_processed += 1;
        if outcome.classify_error.is_some() {
            self.classify_errors += 1;
        }
        self.detections += outcome.detections.len() as u64;
        self.commands_dispatched += outcome.dispatched as u64;
        self.commands_dropped += outcome.dropped as u64;
        self.commands_failed += outcome.failed as u64;
    }
}

pub struct FramePipeline {
    classifier: Box<dyn Classifier>,
    interpreter: GestureInterpreter,
    devices: DeviceStateReader,
    stats: PipelineStats,
    last_presence: Option<Presence>,
}

impl FramePipeline {
    pub fn new(classifier: Box<dyn Classifier>, devices: DeviceStateReader) -> Self {
        Self {
            classifier,
            interpreter: GestureInterpreter::new(),
            devices,
            stats: PipelineStats::default(),
            last_presence: None,
        }
    }

    pub fn classifier_name(&self) -> &'static str {
        self.classifier.name()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Frames dropped upstream, as reported by the feeder.
    pub fn set_frames_dropped(&mut self, dropped: u64) {
        self.stats.frames_dropped = dropped;
    }

    /// Process one frame.
    ///
    /// Never fails: classification errors count as an empty detection set and
    /// dispatch errors are counted per command.
    pub fn deliver(&mut self, frame: &Frame) -> FrameOutcome {
        let mut outcome = FrameOutcome {
            sequence: frame.sequence,
            ..FrameOutcome::default()
        };

        log::debug!(
            "classifying frame {} ({} ms after capture)",
            frame.sequence,
            frame.age().as_millis()
        );
        let view = frame.inference_view();
        match self.classifier.classify(&view) {
            Ok(detections) => outcome.detections = detections,
            Err(e) => {
                log::warn!("classification failed for frame {}: {:#}", frame.sequence, e);
                outcome.classify_error = Some(format!("{:#}", e));
            }
        }

        for detection in &outcome.detections {
            log::debug!(
                "observed {} with {:.2}% confidence",
                detection.label,
                detection.confidence * 100.0
            );
        }
        outcome.commands = self.interpreter.interpret(&outcome.detections);

        // One snapshot per frame: the decision and the handle come from the same state.
        let snapshot = self.devices.load();
        self.note_presence(snapshot.state.presence());

        match snapshot.actuator() {
            Some(light) => {
                for command in &outcome.commands {
                    match light.apply(*command) {
                        Ok(()) => {
                            outcome.dispatched += 1;
                            log::debug!("{} -> {}", command, light.name());
                        }
                        Err(e) => {
                            outcome.failed += 1;
                            log::warn!("{} -> {} failed: {:#}", command, light.name(), e);
                        }
                    }
                }
            }
            None => {
                outcome.dropped = outcome.commands.len();
                if outcome.dropped > 0 {
                    log::debug!(
                        "dropping {} command(s): light {}",
                        outcome.dropped,
                        snapshot.state.presence()
                    );
                }
            }
        }

        self.stats.record(&outcome);
        outcome
    }

    fn note_presence(&mut self, presence: Presence) {
        let previous = self.last_presence.replace(presence);
        let was_enabled = previous == Some(Presence::PresentReachable);
        let enabled = presence == Presence::PresentReachable;
        if previous.is_none() || was_enabled != enabled {
            if enabled {
                log::info!("actuation enabled");
            } else {
                log::info!("actuation disabled (light {})", presence);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Worker
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct WorkerOptions {
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
    pub health_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            max_frames: None,
            health_interval: Duration::from_secs(5),
        }
    }
}

/// Consume frames until the channel disconnects, `running` is cleared, or
/// `max_frames` is reached.
pub fn run_worker(
    pipeline: &mut FramePipeline,
    frames: &Receiver<Frame>,
    running: &AtomicBool,
    feeder: Option<&FeederStats>,
    options: &WorkerOptions,
) -> PipelineStats {
    let mut last_health_log = Instant::now();
    log::info!(
        "pipeline worker running (classifier {})",
        pipeline.classifier_name()
    );

    while running.load(Ordering::SeqCst) {
        let frame = match frames.recv_timeout(RECV_POLL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("frame source closed");
                break;
            }
        };
        pipeline.deliver(&frame);

        if let Some(feeder) = feeder {
            pipeline.set_frames_dropped(feeder.dropped.load(Ordering::Relaxed));
        }
        if last_health_log.elapsed() >= options.health_interval {
            log_health(&pipeline.stats());
            last_health_log = Instant::now();
        }
        if let Some(max) = options.max_frames {
            if pipeline.stats().frames_processed >= max {
                log::info!("processed {} frames; stopping", max);
                break;
            }
        }
    }

    let stats = pipeline.stats();
    log_health(&stats);
    stats
}

/// Run the worker on its own thread. The thread returns the final stats.
pub fn spawn_worker(
    mut pipeline: FramePipeline,
    frames: Receiver<Frame>,
    running: Arc<AtomicBool>,
    feeder: Option<Arc<FeederStats>>,
    options: WorkerOptions,
) -> Result<JoinHandle<PipelineStats>> {
    thread::Builder::new()
        .name("pipeline-worker".to_string())
        .spawn(move || {
            run_worker(
                &mut pipeline,
                &frames,
                &running,
                feeder.as_deref(),
                &options,
            )
        })
        .context("failed to spawn pipeline worker")
}

fn log_health(stats: &PipelineStats) {
    log::info!(
        "pipeline frames={} dropped={} classify_errors={} commands dispatched={} dropped={} failed={}",
        stats.frames_processed,
        stats.frames_dropped,
        stats.classify_errors,
        stats.commands_dispatched,
        stats.commands_dropped,
        stats.commands_failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{GestureLabel, Region, ScriptStep, ScriptedClassifier};
    use crate::device::{DeviceRegistry, RecordingLight};
    use crate::frame::Orientation;
    use crossbeam_channel::bounded;

    fn frame(sequence: u64) -> Frame {
        Frame::from_rgb(vec![0u8; 4 * 4 * 3], 4, 4, Orientation::Up)
            .unwrap()
            .with_sequence(sequence)
    }

    fn open_hand() -> ScriptStep {
        ScriptStep::Detections(vec![Detection::new(
            GestureLabel::Open,
            0.8,
            Region::centered_at(0.1, 0.1),
        )])
    }

    #[test]
    fn absent_light_drops_commands() {
        let registry = DeviceRegistry::new();
        let classifier = ScriptedClassifier::new(vec![open_hand()]);
        let mut pipeline = FramePipeline::new(Box::new(classifier), registry.reader());

        let outcome = pipeline.deliver(&frame(1));
        assert_eq!(outcome.commands, vec![Command::SetPower(true)]);
        assert_eq!((outcome.dispatched, outcome.dropped), (0, 1));
    }

    #[test]
    fn reachable_light_receives_commands() {
        let registry = DeviceRegistry::new();
        let light = Arc::new(RecordingLight::new("Lightbulb"));
        registry.discovered(light.clone(), true);
        let classifier = ScriptedClassifier::new(vec![open_hand()]);
        let mut pipeline = FramePipeline::new(Box::new(classifier), registry.reader());

        let outcome = pipeline.deliver(&frame(1));
        assert_eq!(outcome.dispatched, 1);
        assert_eq!(light.calls(), vec![Command::SetPower(true)]);
    }

    #[test]
    fn classification_failure_is_contained() {
        let registry = DeviceRegistry::new();
        let light = Arc::new(RecordingLight::new("Lightbulb"));
        registry.discovered(light.clone(), true);
        let classifier =
            ScriptedClassifier::new(vec![ScriptStep::Fail("model busy".into()), open_hand()]);
        let mut pipeline = FramePipeline::new(Box::new(classifier), registry.reader());

        let failed = pipeline.deliver(&frame(1));
        assert!(failed.classify_error.is_some());
        assert!(failed.commands.is_empty());

        let next = pipeline.deliver(&frame(2));
        assert_eq!(next.dispatched, 1);
        assert_eq!(pipeline.stats().classify_errors, 1);
        assert_eq!(pipeline.stats().frames_processed, 2);
    }

    #[test]
    fn worker_stops_after_max_frames() {
        let registry = DeviceRegistry::new();
        let classifier = ScriptedClassifier::new(vec![open_hand()]);
        let mut pipeline = FramePipeline::new(Box::new(classifier), registry.reader());
        let (tx, rx) = bounded(4);
        for sequence in 1..=4 {
            tx.send(frame(sequence)).unwrap();
        }
        let running = AtomicBool::new(true);
        let options = WorkerOptions {
            max_frames: Some(3),
            ..WorkerOptions::default()
        };

        let stats = run_worker(&mut pipeline, &rx, &running, None, &options);
        assert_eq!(stats.frames_processed, 3);
        assert_eq!(stats.commands_dropped, 3);
    }

    #[test]
    fn worker_ends_when_source_disconnects() {
        let registry = DeviceRegistry::new();
        let classifier = ScriptedClassifier::new(Vec::new());
        let pipeline = FramePipeline::new(Box::new(classifier), registry.reader());
        let (tx, rx) = bounded(1);
        tx.send(frame(1)).unwrap();
        drop(tx);

        let handle = spawn_worker(
            pipeline,
            rx,
            Arc::new(AtomicBool::new(true)),
            None,
            WorkerOptions::default(),
        )
        .unwrap();
        let stats = handle.join().unwrap();
        assert_eq!(stats.frames_processed, 1);
        assert_eq!(stats.detections, 0);
    }
}
