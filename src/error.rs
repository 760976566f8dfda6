//! Error types for the detection-to-event pipeline.

use thiserror::Error;

/// Failures that end a stream's pipeline.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("frame unreadable on stream {stream}: {source}")]
    FrameUnreadable {
        stream: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("detector {detector} failed on frame {frame_index}: {source}")]
    Detector {
        detector: &'static str,
        frame_index: u64,
        #[source]
        source: anyhow::Error,
    },
}

/// The recognition stage that produced an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    PlateText,
    Nationality,
    Color,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::PlateText => "plate-text",
            Stage::Nationality => "nationality",
            Stage::Color => "color",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-vehicle recognition failures. None of these stop the stream.
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("plate unreadable: {text:?} is shorter than {min_chars} characters")]
    PlateUnreadable { text: String, min_chars: usize },

    #[error("plate region missing from captured frame: {0}")]
    PlateRegionMissing(anyhow::Error),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error("crop file error: {0}")]
    CropIo(anyhow::Error),

    #[error(transparent)]
    Event(#[from] EventError),
}

impl RecognitionError {
    pub fn stage(stage: Stage, source: anyhow::Error) -> Self {
        RecognitionError::Stage { stage, source }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EventError {
    #[error("event field {0} is empty")]
    MissingField(&'static str),
}
