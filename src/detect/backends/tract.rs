#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::Result;

use crate::detect::backend::ObjectDetector;
use crate::detect::result::{Detection, DetectionFrame};
use crate::frame::{Frame, Rect};
use crate::onnx::{self, Normalize, OnnxPlan};

/// Default YOLOv8 input edge.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Tract-based YOLOv8 detector for the vehicle / plate / brand model.
///
/// Frames are stretched to the model input, boxes are scaled back to frame
/// pixels. No NMS is applied: the class resolver keeps one candidate per
/// class, so overlapping boxes are harmless.
pub struct TractBackend {
    model: OnnxPlan,
    input_size: u32,
    confidence_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model = onnx::load_model(model_path.as_ref(), DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE)?;
        Ok(Self {
            model,
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: 0.25,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }
}

impl ObjectDetector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionFrame> {
        let image = onnx::frame_to_image(frame)?;
        let input = onnx::resize(&image, self.input_size, self.input_size);
        let output = onnx::run_first_output(
            &self.model,
            onnx::image_to_tensor(&input, Normalize::NONE),
        )?;

        let sx = frame.width as f32 / self.input_size as f32;
        let sy = frame.height as f32 / self.input_size as f32;
        let detections = onnx::decode_yolo(&output, self.confidence_threshold)?
            .into_iter()
            .map(|b| {
                Detection::new(
                    b.class_id as u32,
                    b.score,
                    Rect::from_center(b.cx, b.cy, b.w, b.h).scaled(sx, sy),
                )
            })
            .collect();

        Ok(DetectionFrame::new(frame.index, detections))
    }
}
