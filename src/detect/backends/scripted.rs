use anyhow::Result;
use std::collections::VecDeque;

use crate::detect::backend::{DetectionFrame, DetectionSource};

/// In-memory detection source that replays a fixed list of frames.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSource {
    frames: VecDeque<DetectionFrame>,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = DetectionFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn push(&mut self, frame: DetectionFrame) {
        self.frames.push_back(frame);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl DetectionSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn next_frame(&mut self) -> Result<Option<DetectionFrame>> {
        Ok(self.frames.pop_front())
    }
}
