use anyhow::Result;

use crate::detect::result::DetectionFrame;
use crate::frame::Frame;

/// Object detector backend.
///
/// One call per video frame. Implementations emit every box above their own
/// internal floor; duplicate and competing boxes are expected and are
/// collapsed later by the class resolver.
pub trait ObjectDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. The returned `frame_index` must match
    /// `frame.index`.
    fn detect(&mut self, frame: &Frame) -> Result<DetectionFrame>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
