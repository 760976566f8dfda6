use anyhow::Result;
use std::collections::VecDeque;

use crate::detect::backend::ObjectDetector;
use crate::detect::result::{Detection, DetectionFrame};
use crate::frame::{Frame, Rect};
use crate::ingest::file::{synthetic_vehicle_rect, SYNTHETIC_PERIOD};
use crate::labels::{BRAND_FIRST, CLASS_CAR, CLASS_PLATE};

/// Stub backend for tests and dry runs. Replays a scripted list of
/// per-frame detections, then reports empty frames forever (or starts the
/// script over, when cycling).
#[derive(Default)]
pub struct StubBackend {
    script: VecDeque<Vec<Detection>>,
    cycle: bool,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detections to report, one entry per upcoming frame.
    pub fn scripted(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script: script.into(),
            cycle: false,
        }
    }

    /// Like `scripted`, but loops over the script indefinitely.
    pub fn cycling(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script: script.into(),
            cycle: true,
        }
    }

    /// Detections matching the `stub://` file source: a car with a plate and
    /// a brand wherever the synthetic block is.
    pub fn synthetic_lane() -> Self {
        let script = (1..=SYNTHETIC_PERIOD)
            .map(|index| match synthetic_vehicle_rect(index) {
                Some(body) => vec![
                    Detection::new(CLASS_CAR, 0.9, body),
                    Detection::new(
                        CLASS_PLATE,
                        0.8,
                        Rect::new(body.x1 + 15.0, body.y1 + 25.0, body.x2 - 15.0, body.y2 - 5.0),
                    ),
                    Detection::new(BRAND_FIRST, 0.7, body),
                ],
                None => Vec::new(),
            })
            .collect();
        Self::cycling(script)
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl ObjectDetector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionFrame> {
        let detections = self.script.pop_front().unwrap_or_default();
        if self.cycle {
            self.script.push_back(detections.clone());
        }
        Ok(DetectionFrame::new(frame.index, detections))
    }
}
