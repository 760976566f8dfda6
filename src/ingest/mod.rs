//! Frame ingestion sources.
//!
//! - Local video files (decoded with ffmpeg, feature: ingest-file-ffmpeg)
//! - `stub://` synthetic scenes for development without a camera
//! - Replay of prepared frames (tests)
//!
//! Every source hands out RGB24 `Frame`s with indexes starting at 1. An error
//! from `next_frame` means the stream has no more frames to give.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod replay;

use anyhow::Result;

use crate::frame::Frame;

pub use file::{FileConfig, FileSource, FileStats};
pub use replay::ReplaySource;

/// A stream of frames owned by one pipeline.
pub trait FrameSource: Send {
    /// Open the underlying capture resource.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool {
        true
    }

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}
