//! Per-stream pipeline: read, detect, resolve, trigger, recognize, publish.
//!
//! One `StreamPipeline` owns everything mutable about its stream (frame
//! source, detector, capture trigger). Models and the publisher are shared
//! read-only with other streams.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::detect::ObjectDetector;
use crate::error::{RecognitionError, StreamError};
use crate::event::VehicleEvent;
use crate::ingest::FrameSource;
use crate::publish::{Publisher, DEFAULT_TOPIC};
use crate::recognize::RecognitionStageRunner;
use crate::resolver::resolve;
use crate::trigger::{CaptureTrigger, CapturedFrame, TriggerDecision, TriggerSettings, TriggerState};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// What one frame amounted to.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// No complete vehicle on the frame.
    Idle,
    /// A vehicle is resolved but has not come to rest.
    Armed,
    /// The trigger fired and the event went out.
    Published(VehicleEvent),
    /// The trigger fired but the plate text was too short.
    PlateUnreadable,
    /// The trigger fired but a recognition stage failed.
    RecognitionFailed,
    /// The event was built but the publisher refused it.
    PublishFailed,
    /// The vehicle was already captured; waiting for it to leave.
    Suppressed,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub frames: u64,
    pub fired: u64,
    pub published: u64,
    pub unreadable: u64,
    pub failed: u64,
}

#[derive(Debug)]
pub enum StopReason {
    Cancelled,
    /// Stopped after the first published event, as requested.
    Completed,
    Failed(StreamError),
}

#[derive(Debug)]
pub struct StreamReport {
    pub stream_id: String,
    pub summary: StreamSummary,
    pub stop: StopReason,
}

pub struct StreamPipeline {
    stream_id: String,
    source: Box<dyn FrameSource>,
    detector: Box<dyn ObjectDetector>,
    trigger: CaptureTrigger,
    runner: RecognitionStageRunner,
    publisher: Arc<dyn Publisher>,
    topic: String,
    stop_after_publish: bool,
    summary: StreamSummary,
}

impl StreamPipeline {
    pub fn new(
        stream_id: impl Into<String>,
        source: Box<dyn FrameSource>,
        detector: Box<dyn ObjectDetector>,
        runner: RecognitionStageRunner,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            source,
            detector,
            trigger: CaptureTrigger::default(),
            runner,
            publisher,
            topic: DEFAULT_TOPIC.to_string(),
            stop_after_publish: false,
            summary: StreamSummary::default(),
        }
    }

    pub fn with_trigger(mut self, settings: TriggerSettings) -> Self {
        self.trigger = CaptureTrigger::new(settings);
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// End `run` once one event has been published.
    pub fn stop_after_publish(mut self, stop: bool) -> Self {
        self.stop_after_publish = stop;
        self
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn summary(&self) -> &StreamSummary {
        &self.summary
    }

    pub fn trigger_state(&self) -> &TriggerState {
        self.trigger.state()
    }

    pub fn connect(&mut self) -> Result<(), StreamError> {
        self.detector
            .warm_up()
            .map_err(|source| StreamError::Detector {
                detector: self.detector.name(),
                frame_index: 0,
                source,
            })?;
        self.source
            .connect()
            .map_err(|source| StreamError::FrameUnreadable {
                stream: self.stream_id.clone(),
                source,
            })?;
        log::info!(
            "stream {}: connected to {} (detector: {})",
            self.stream_id,
            self.source.describe(),
            self.detector.name()
        );
        Ok(())
    }

    /// Process exactly one frame.
    pub fn step(&mut self) -> Result<StepOutcome, StreamError> {
        let frame = self
            .source
            .next_frame()
            .map_err(|source| StreamError::FrameUnreadable {
                stream: self.stream_id.clone(),
                source,
            })?;
        self.summary.frames += 1;

        let detections = self
            .detector
            .detect(&frame)
            .map_err(|source| StreamError::Detector {
                detector: self.detector.name(),
                frame_index: frame.index,
                source,
            })?;
        let resolved = resolve(&detections);

        match self.trigger.observe(frame, resolved) {
            TriggerDecision::Fired(captured) => {
                self.summary.fired += 1;
                Ok(self.recognize_and_publish(captured))
            }
            TriggerDecision::NotYet => Ok(match self.trigger.state() {
                TriggerState::Idle => StepOutcome::Idle,
                TriggerState::Armed { .. } => StepOutcome::Armed,
                TriggerState::AwaitingDeparture { .. } => StepOutcome::Suppressed,
            }),
        }
    }

    fn recognize_and_publish(&mut self, captured: CapturedFrame) -> StepOutcome {
        let frame_index = captured.frame.index;
        match self.runner.run(&captured.frame, &captured.resolved) {
            Ok(event) => match self.publish(&event) {
                Ok(()) => {
                    self.summary.published += 1;
                    log::info!(
                        "stream {}: published {} {} {} ({}, {}) passage {}",
                        self.stream_id,
                        event.vehicle_type(),
                        event.brand(),
                        event.registration(),
                        event.country(),
                        event.color(),
                        event.correlation_id()
                    );
                    StepOutcome::Published(event)
                }
                Err(err) => {
                    self.summary.failed += 1;
                    log::error!(
                        "stream {}: failed to publish passage {}: {:#}",
                        self.stream_id,
                        event.correlation_id(),
                        err
                    );
                    StepOutcome::PublishFailed
                }
            },
            Err(RecognitionError::PlateUnreadable { text, min_chars }) => {
                self.summary.unreadable += 1;
                log::warn!(
                    "stream {}: frame {}: plate {:?} unreadable (< {} chars), vehicle dropped",
                    self.stream_id,
                    frame_index,
                    text,
                    min_chars
                );
                StepOutcome::PlateUnreadable
            }
            Err(err) => {
                self.summary.failed += 1;
                log::error!(
                    "stream {}: frame {}: recognition failed: {:#}",
                    self.stream_id,
                    frame_index,
                    anyhow::Error::from(err)
                );
                StepOutcome::RecognitionFailed
            }
        }
    }

    fn publish(&self, event: &VehicleEvent) -> anyhow::Result<()> {
        let payload = event.to_json()?;
        self.publisher.publish(&self.topic, &payload)
    }

    /// Run until `cancel` is set, the source fails, or (when requested) the
    /// first event is published. Consumes the pipeline so the frame source
    /// is released on return.
    pub fn run(mut self, cancel: &AtomicBool) -> StreamReport {
        let stop = self.run_loop(cancel);
        if !matches!(self.trigger.state(), TriggerState::Idle) {
            log::debug!(
                "stream {}: discarding trigger state {:?}",
                self.stream_id,
                self.trigger.state()
            );
        }
        self.trigger.reset();
        match &stop {
            StopReason::Failed(err) => log::warn!("stream {} stopped: {}", self.stream_id, err),
            other => log::info!("stream {} stopped: {:?}", self.stream_id, other),
        }
        StreamReport {
            stream_id: self.stream_id,
            summary: self.summary,
            stop,
        }
    }

    fn run_loop(&mut self, cancel: &AtomicBool) -> StopReason {
        if let Err(err) = self.connect() {
            return StopReason::Failed(err);
        }
        let mut last_health = Instant::now();
        loop {
            if cancel.load(Ordering::SeqCst) {
                return StopReason::Cancelled;
            }
            match self.step() {
                Ok(StepOutcome::Published(_)) if self.stop_after_publish => {
                    return StopReason::Completed;
                }
                Ok(_) => {}
                Err(err) => return StopReason::Failed(err),
            }
            if last_health.elapsed() >= HEALTH_LOG_INTERVAL {
                self.log_health();
                last_health = Instant::now();
            }
        }
    }

    fn log_health(&self) {
        let s = &self.summary;
        log::info!(
            "stream {} health: source_ok={} frames={} fired={} published={} unreadable={} failed={}",
            self.stream_id,
            self.source.is_healthy(),
            s.frames,
            s.fired,
            s.published,
            s.unreadable,
            s.failed
        );
    }
}
