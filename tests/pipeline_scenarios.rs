use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tempfile::TempDir;

use vehicle_inspector::event::EventPayload;
use vehicle_inspector::labels::{CLASS_CAR, CLASS_PLATE};
use vehicle_inspector::recognize::{FixedColor, FixedNationality, FixedPlateReader};
use vehicle_inspector::{
    ColorClassifier, Detection, Frame, MemoryPublisher, Publisher, RecognitionSettings,
    RecognitionStageRunner, Rect, ReplaySource, StepOutcome, StopReason, StreamError,
    StreamPipeline, StubBackend, TriggerState,
};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;
const GREY: [u8; 3] = [128, 128, 128];
const WHITE: [u8; 3] = [255, 255, 255];
const TOYOTA: u32 = 3;

fn lane(index: u64, patch: Option<Rect>) -> Frame {
    let mut frame = Frame::filled(index, WIDTH, HEIGHT, GREY);
    if let Some(rect) = patch {
        frame.fill_rect(rect, WHITE);
    }
    frame
}

fn car_only() -> Vec<Detection> {
    vec![Detection::new(
        CLASS_CAR,
        0.9,
        Rect::new(20.0, 30.0, 140.0, 100.0),
    )]
}

fn full_vehicle() -> Vec<Detection> {
    vec![
        Detection::new(CLASS_CAR, 0.9, Rect::new(20.0, 30.0, 140.0, 100.0)),
        Detection::new(CLASS_PLATE, 0.7, Rect::new(50.0, 70.0, 110.0, 90.0)),
        Detection::new(TOYOTA, 0.6, Rect::new(20.0, 30.0, 140.0, 100.0)),
    ]
}

/// Seed frame, a small armed patch (50 px²), then a large one (500 px²).
fn arrival() -> (Vec<Frame>, Vec<Vec<Detection>>) {
    let frames = vec![
        lane(1, None),
        lane(2, Some(Rect::new(20.0, 20.0, 30.0, 25.0))),
        lane(3, Some(Rect::new(100.0, 60.0, 120.0, 85.0))),
    ];
    let detections = vec![car_only(), full_vehicle(), full_vehicle()];
    (frames, detections)
}

struct Harness {
    crop_dir: TempDir,
    publisher: Arc<MemoryPublisher>,
}

impl Harness {
    fn new() -> Self {
        Self {
            crop_dir: tempfile::tempdir().unwrap(),
            publisher: Arc::new(MemoryPublisher::new()),
        }
    }

    fn runner(
        &self,
        plate: &str,
        country: Option<&str>,
        color: Arc<dyn ColorClassifier>,
    ) -> RecognitionStageRunner {
        RecognitionStageRunner::new(
            Arc::new(FixedPlateReader::new(plate)),
            Arc::new(FixedNationality::new(country)),
            color,
            RecognitionSettings {
                crop_dir: Some(self.crop_dir.path().to_path_buf()),
                ..RecognitionSettings::default()
            },
        )
    }

    fn pipeline(
        &self,
        frames: Vec<Frame>,
        detections: Vec<Vec<Detection>>,
        runner: RecognitionStageRunner,
    ) -> StreamPipeline {
        self.pipeline_with(frames, detections, runner, self.publisher.clone())
    }

    fn pipeline_with(
        &self,
        frames: Vec<Frame>,
        detections: Vec<Vec<Detection>>,
        runner: RecognitionStageRunner,
        publisher: Arc<dyn Publisher>,
    ) -> StreamPipeline {
        StreamPipeline::new(
            "lane-test",
            Box::new(ReplaySource::new("lane-test", frames)),
            Box::new(StubBackend::scripted(detections)),
            runner,
            publisher,
        )
    }

    fn leftover_crops(&self) -> usize {
        std::fs::read_dir(self.crop_dir.path()).unwrap().count()
    }
}

struct FailingColor;

impl ColorClassifier for FailingColor {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn classify(&self, _screenshot: &Path) -> Result<String> {
        Err(anyhow!("color model unavailable"))
    }
}

struct RefusingPublisher;

impl Publisher for RefusingPublisher {
    fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<()> {
        Err(anyhow!("broker unreachable"))
    }
}

#[test]
fn vehicle_arriving_is_published_once() {
    let harness = Harness::new();
    let runner = harness.runner("AB123CD", Some("france"), Arc::new(FixedColor::new("White")));
    let (frames, detections) = arrival();
    let mut pipeline = harness.pipeline(frames, detections, runner);
    pipeline.connect().unwrap();

    assert_eq!(pipeline.step().unwrap(), StepOutcome::Idle);
    assert_eq!(pipeline.step().unwrap(), StepOutcome::Armed);
    assert!(harness.publisher.is_empty());

    let event = match pipeline.step().unwrap() {
        StepOutcome::Published(event) => event,
        other => panic!("expected a published event, got {other:?}"),
    };
    assert_eq!(event.vehicle_type(), "car");
    assert_eq!(event.brand(), "Toyota");
    assert_eq!(event.registration(), "AB123CD");
    assert_eq!(event.country(), "france");
    assert_eq!(event.color(), "White");
    assert!(matches!(
        pipeline.trigger_state(),
        TriggerState::AwaitingDeparture { fired_frame: 3 }
    ));

    let messages = harness.publisher.messages();
    assert_eq!(messages.len(), 1);
    let (topic, payload) = &messages[0];
    assert_eq!(topic, "features_message");
    let payload: EventPayload = serde_json::from_slice(payload).unwrap();
    assert_eq!(payload.code, "1002");
    assert_eq!(payload.registration, "AB123CD");
    assert_eq!(payload.uidpassage, event.correlation_id().to_string());
    assert_eq!(payload.classificators.len(), 1);
    assert_eq!(payload.classificators[0].uid, payload.uidpassage);

    let summary = pipeline.summary();
    assert_eq!((summary.frames, summary.fired, summary.published), (3, 1, 1));
    assert_eq!(harness.leftover_crops(), 0);
}

#[test]
fn short_plate_text_drops_the_vehicle() {
    let harness = Harness::new();
    let runner = harness.runner("AB1", Some("france"), Arc::new(FixedColor::new("White")));
    let (frames, detections) = arrival();
    let mut pipeline = harness.pipeline(frames, detections, runner);

    assert_eq!(pipeline.step().unwrap(), StepOutcome::Idle);
    assert_eq!(pipeline.step().unwrap(), StepOutcome::Armed);
    assert_eq!(pipeline.step().unwrap(), StepOutcome::PlateUnreadable);

    assert!(harness.publisher.is_empty());
    assert_eq!(harness.leftover_crops(), 0);
    assert_eq!(pipeline.summary().unreadable, 1);
    assert_eq!(pipeline.summary().published, 0);
    assert!(matches!(
        pipeline.trigger_state(),
        TriggerState::AwaitingDeparture { .. }
    ));
}

#[test]
fn unknown_plate_origin_uses_fallback_country() {
    let harness = Harness::new();
    let runner = harness.runner("AB123CD", None, Arc::new(FixedColor::new("")));
    let (frames, detections) = arrival();
    let mut pipeline = harness.pipeline(frames, detections, runner);

    pipeline.step().unwrap();
    pipeline.step().unwrap();
    let event = match pipeline.step().unwrap() {
        StepOutcome::Published(event) => event,
        other => panic!("expected a published event, got {other:?}"),
    };
    assert_eq!(event.country(), "america");
    assert_eq!(event.color(), "silver");
    assert_eq!(harness.publisher.len(), 1);
}

#[test]
fn trigger_rearms_only_after_vehicle_departs() {
    let harness = Harness::new();
    let runner = harness.runner("AB123CD", Some("france"), Arc::new(FixedColor::new("White")));
    let (mut frames, mut detections) = arrival();
    let parked = Rect::new(100.0, 60.0, 120.0, 85.0);
    frames.push(lane(4, Some(parked)));
    detections.push(full_vehicle());
    frames.push(lane(5, None));
    detections.push(Vec::new());
    frames.push(lane(6, Some(Rect::new(10.0, 90.0, 40.0, 110.0))));
    detections.push(full_vehicle());

    let mut pipeline = harness.pipeline(frames, detections, runner);
    let outcomes: Vec<StepOutcome> = (0..6).map(|_| pipeline.step().unwrap()).collect();

    assert_eq!(outcomes[0], StepOutcome::Idle);
    assert_eq!(outcomes[1], StepOutcome::Armed);
    assert!(matches!(outcomes[2], StepOutcome::Published(_)));
    assert_eq!(outcomes[3], StepOutcome::Suppressed);
    assert_eq!(outcomes[4], StepOutcome::Idle);
    assert!(matches!(outcomes[5], StepOutcome::Published(_)));

    let messages = harness.publisher.messages();
    assert_eq!(messages.len(), 2);
    let first: EventPayload = serde_json::from_slice(&messages[0].1).unwrap();
    let second: EventPayload = serde_json::from_slice(&messages[1].1).unwrap();
    assert_ne!(first.uidpassage, second.uidpassage);
}

#[test]
fn failed_recognition_stage_publishes_nothing() {
    let harness = Harness::new();
    let runner = harness.runner("AB123CD", Some("france"), Arc::new(FailingColor));
    let (frames, detections) = arrival();
    let mut pipeline = harness.pipeline(frames, detections, runner);

    pipeline.step().unwrap();
    pipeline.step().unwrap();
    assert_eq!(pipeline.step().unwrap(), StepOutcome::RecognitionFailed);
    assert!(harness.publisher.is_empty());
    assert_eq!(pipeline.summary().failed, 1);
    assert_eq!(harness.leftover_crops(), 0);
}

#[test]
fn publisher_failure_is_reported_per_event() {
    let harness = Harness::new();
    let runner = harness.runner("AB123CD", Some("france"), Arc::new(FixedColor::new("White")));
    let (frames, detections) = arrival();
    let mut pipeline =
        harness.pipeline_with(frames, detections, runner, Arc::new(RefusingPublisher));

    pipeline.step().unwrap();
    pipeline.step().unwrap();
    assert_eq!(pipeline.step().unwrap(), StepOutcome::PublishFailed);
    assert_eq!(pipeline.summary().fired, 1);
    assert_eq!(pipeline.summary().published, 0);
}

#[test]
fn run_stops_after_first_event_when_requested() {
    let harness = Harness::new();
    let runner = harness.runner("AB123CD", Some("france"), Arc::new(FixedColor::new("White")));
    let (mut frames, mut detections) = arrival();
    frames.push(lane(4, None));
    detections.push(Vec::new());

    let pipeline = harness
        .pipeline(frames, detections, runner)
        .with_topic("lane/events")
        .stop_after_publish(true);
    let report = pipeline.run(&AtomicBool::new(false));

    assert!(matches!(report.stop, StopReason::Completed));
    assert_eq!(report.stream_id, "lane-test");
    assert_eq!(report.summary.frames, 3);
    assert_eq!(report.summary.published, 1);
    assert_eq!(harness.publisher.messages()[0].0, "lane/events");
}

#[test]
fn run_ends_when_source_is_exhausted() {
    let harness = Harness::new();
    let runner = harness.runner("AB123CD", Some("france"), Arc::new(FixedColor::new("White")));
    let (frames, detections) = arrival();

    let report = harness
        .pipeline(frames, detections, runner)
        .run(&AtomicBool::new(false));

    assert!(matches!(
        report.stop,
        StopReason::Failed(StreamError::FrameUnreadable { .. })
    ));
    assert_eq!(report.summary.frames, 3);
    assert_eq!(report.summary.published, 1);
}

#[test]
fn cancelled_run_reads_no_frames() {
    let harness = Harness::new();
    let runner = harness.runner("AB123CD", Some("france"), Arc::new(FixedColor::new("White")));
    let (frames, detections) = arrival();

    let report = harness
        .pipeline(frames, detections, runner)
        .run(&AtomicBool::new(true));

    assert!(matches!(report.stop, StopReason::Cancelled));
    assert_eq!(report.summary.frames, 0);
    assert!(harness.publisher.is_empty());
}

#[test]
fn concurrent_streams_keep_independent_trigger_state() {
    let harness = Harness::new();
    let north_runner =
        harness.runner("NORTH111", Some("france"), Arc::new(FixedColor::new("White")));
    let south_runner = harness.runner("SOUTH222", Some("qatar"), Arc::new(FixedColor::new("Red")));

    let (north_frames, north_detections) = arrival();
    let north = StreamPipeline::new(
        "north",
        Box::new(ReplaySource::new("north", north_frames)),
        Box::new(StubBackend::scripted(north_detections)),
        north_runner,
        harness.publisher.clone(),
    );

    // A larger frame size and a vehicle that stays still for two frames
    // before moving: shared motion state would reseed or fire early.
    let south_frame = |index: u64, patch: Option<Rect>| {
        let mut frame = Frame::filled(index, 200, 150, GREY);
        if let Some(rect) = patch {
            frame.fill_rect(rect, WHITE);
        }
        frame
    };
    let south_frames = vec![
        south_frame(1, None),
        south_frame(2, None),
        south_frame(3, None),
        south_frame(4, Some(Rect::new(120.0, 100.0, 150.0, 130.0))),
    ];
    let south_detections = vec![Vec::new(), full_vehicle(), full_vehicle(), full_vehicle()];
    let south = StreamPipeline::new(
        "south",
        Box::new(ReplaySource::new("south", south_frames)),
        Box::new(StubBackend::scripted(south_detections)),
        south_runner,
        harness.publisher.clone(),
    );

    let cancel = AtomicBool::new(false);
    let (north_report, south_report) = std::thread::scope(|scope| {
        let north = scope.spawn(|| north.run(&cancel));
        let south = scope.spawn(|| south.run(&cancel));
        (north.join().unwrap(), south.join().unwrap())
    });

    assert_eq!(north_report.stream_id, "north");
    assert_eq!((north_report.summary.frames, north_report.summary.fired), (3, 1));
    assert_eq!(north_report.summary.published, 1);
    assert_eq!(south_report.stream_id, "south");
    assert_eq!((south_report.summary.frames, south_report.summary.fired), (4, 1));
    assert_eq!(south_report.summary.published, 1);

    let mut published: Vec<(String, String)> = harness
        .publisher
        .messages()
        .iter()
        .map(|(_, payload)| {
            let payload: EventPayload = serde_json::from_slice(payload).unwrap();
            (payload.registration, payload.classificators[0].country.clone())
        })
        .collect();
    published.sort();
    assert_eq!(
        published,
        vec![
            ("NORTH111".to_string(), "france".to_string()),
            ("SOUTH222".to_string(), "qatar".to_string()),
        ]
    );
    assert_eq!(harness.leftover_crops(), 0);
}
