use crate::frame::Rect;

/// One raw detector output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub bbox: Rect,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: Rect) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }
}

/// All detections for one video frame, in detector order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionFrame {
    pub frame_index: u64,
    pub detections: Vec<Detection>,
}

impl DetectionFrame {
    pub fn new(frame_index: u64, detections: Vec<Detection>) -> Self {
        Self {
            frame_index,
            detections,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
