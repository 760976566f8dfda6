use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use super::FrameSource;
use crate::frame::Frame;

/// Hands out a prepared list of frames, then reports the stream as ended.
pub struct ReplaySource {
    name: String,
    frames: VecDeque<Frame>,
    served: u64,
}

impl ReplaySource {
    pub fn new(name: impl Into<String>, frames: Vec<Frame>) -> Self {
        Self {
            name: name.into(),
            frames: frames.into(),
            served: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Frame> {
        let frame = self
            .frames
            .pop_front()
            .ok_or_else(|| anyhow!("replay {} exhausted after {} frames", self.name, self.served))?;
        self.served += 1;
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("replay {}", self.name)
    }
}
