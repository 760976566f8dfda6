//! Object detection layer: the detector trait, its backends and the raw
//! per-frame output they produce.

mod backend;
mod backends;
mod result;

pub use backend::ObjectDetector;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{Detection, DetectionFrame};
