//! Local file frame source.
//!
//! `FileSource` reads frames from a local video file (no network access).
//! Paths starting with `stub://` produce a synthetic scene instead: an empty
//! lane with a bright block that shows up for a few frames every cycle.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::FrameSource;
use crate::frame::{Frame, Rect};

/// Configuration for a local file source.
#[derive(Clone, Debug, PartialEq)]
pub struct FileConfig {
    /// Local file path (e.g., "/var/lib/vehicled/lane1.mp4") or `stub://<name>`.
    pub path: String,
    /// Frames per second to keep; 0 keeps every decoded frame.
    pub target_fps: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            target_fps: 10,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes): {}",
                config.path
            ));
        }
        if config.path.starts_with("stub://") {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(config)),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)?),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(anyhow!(
                    "file ingestion requires the ingest-file-ffmpeg feature"
                ))
            }
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> FileStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.is_healthy(),
        }
    }

    fn describe(&self) -> String {
        format!("file {}", self.stats().path)
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_captured: u64,
    pub path: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

pub const SYNTHETIC_WIDTH: u32 = 640;
pub const SYNTHETIC_HEIGHT: u32 = 480;
/// Frames per synthetic arrival cycle.
pub const SYNTHETIC_CYCLE: u64 = 30;
/// Offset within a cycle at which the block appears.
pub const SYNTHETIC_ARRIVAL: u64 = 20;
const SYNTHETIC_CELL: u32 = 80;
const SYNTHETIC_COLUMNS: u64 = (SYNTHETIC_WIDTH / SYNTHETIC_CELL) as u64;
const SYNTHETIC_SPOTS: u64 = SYNTHETIC_COLUMNS * (SYNTHETIC_HEIGHT / SYNTHETIC_CELL) as u64;
/// Frames before the synthetic scene repeats exactly.
pub const SYNTHETIC_PERIOD: u64 = SYNTHETIC_CYCLE * SYNTHETIC_SPOTS;
const LANE_GREY: [u8; 3] = [96, 96, 96];
const VEHICLE_WHITE: [u8; 3] = [235, 235, 235];

/// Where the synthetic block sits on frame `index`, if it is present.
///
/// Each cycle uses the next cell of an 80 px grid, so a cell is revisited
/// only after the background model has long settled again.
pub fn synthetic_vehicle_rect(index: u64) -> Option<Rect> {
    let offset = index.checked_sub(1)?;
    if offset % SYNTHETIC_CYCLE < SYNTHETIC_ARRIVAL {
        return None;
    }
    let spot = (offset / SYNTHETIC_CYCLE) % SYNTHETIC_SPOTS;
    let x = (spot % SYNTHETIC_COLUMNS) as f32 * SYNTHETIC_CELL as f32 + 10.0;
    let y = (spot / SYNTHETIC_COLUMNS) as f32 * SYNTHETIC_CELL as f32 + 20.0;
    Some(Rect::new(x, y, x + 60.0, y + 40.0))
}

struct SyntheticFileSource {
    config: FileConfig,
    frame_count: u64,
}

impl SyntheticFileSource {
    fn new(config: FileConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("FileSource: connected to {} (synthetic)", self.config.path);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let mut frame = Frame::filled(
            self.frame_count,
            SYNTHETIC_WIDTH,
            SYNTHETIC_HEIGHT,
            LANE_GREY,
        );
        if let Some(rect) = synthetic_vehicle_rect(self.frame_count) {
            frame.fill_rect(rect, VEHICLE_WHITE);
        }
        Ok(frame)
    }

    fn stats(&self) -> FileStats {
        FileStats {
            frames_captured: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
