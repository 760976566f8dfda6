//! Vehicle Inspector
//!
//! Watches parking-lane video, decides when a vehicle has come to rest in
//! front of the camera, reads its plate, country and colour, and publishes
//! one event per passage over MQTT.
//!
//! # Architecture
//!
//! Each video stream runs one sequential pipeline:
//!
//! 1. **Detect**: an object detector emits vehicle-type, plate and brand boxes.
//! 2. **Resolve**: competing boxes collapse to one label per role; frames
//!    missing any role are skipped.
//! 3. **Trigger**: background subtraction picks the single frame where the
//!    resolved vehicle fills the lane.
//! 4. **Recognize**: plate text, plate nationality and body colour are read
//!    from that frame.
//! 5. **Publish**: the assembled event goes out as JSON on `features_message`.
//!
//! Streams share models and the publisher; nothing else crosses between them.
//!
//! # Module Structure
//!
//! - `frame`: RGB frames, boxes, crops, JPEG encoding
//! - `ingest`: frame sources (local files, synthetic, replay)
//! - `detect`: detector trait and backends
//! - `resolver`: per-frame class resolution
//! - `motion`, `trigger`: background model and capture trigger
//! - `recognize`: recognition stages and their backends
//! - `event`, `publish`: event record, wire payload, publishers
//! - `pipeline`: per-stream orchestration
//! - `config`: daemon configuration

pub mod config;
pub mod detect;
pub mod error;
pub mod event;
pub mod frame;
pub mod ingest;
pub mod labels;
pub mod motion;
#[cfg(feature = "backend-tract")]
mod onnx;
pub mod pipeline;
pub mod publish;
pub mod recognize;
pub mod resolver;
pub mod trigger;

pub use config::VehicledConfig;
pub use detect::{Detection, DetectionFrame, ObjectDetector, StubBackend};
pub use error::{EventError, RecognitionError, Stage, StreamError};
pub use event::{assemble, VehicleEvent};
pub use frame::{Frame, Rect};
pub use ingest::{FileConfig, FileSource, FrameSource, ReplaySource};
pub use pipeline::{StepOutcome, StopReason, StreamPipeline, StreamReport, StreamSummary};
pub use publish::{LogPublisher, MemoryPublisher, MqttPublisher, Publisher};
pub use recognize::{
    ColorClassifier, NationalityClassifier, PlateReader, RecognitionSettings,
    RecognitionStageRunner,
};
pub use resolver::{resolve, ClassCandidateMap, ResolvedClasses, VehicleKind};
pub use trigger::{CaptureTrigger, TriggerDecision, TriggerSettings, TriggerState};
