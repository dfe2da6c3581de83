use anyhow::Result;
use std::time::Duration;

use super::result::Detection;

/// Detector output for a single frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionFrame {
    /// Capture offset from the start of the stream, when the source knows it.
    pub offset: Option<Duration>,
    /// Detections in frame pixel coordinates. Empty means nothing was seen.
    pub detections: Vec<Detection>,
}

impl DetectionFrame {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            offset: None,
            detections,
        }
    }

    pub fn at(offset: Duration, detections: Vec<Detection>) -> Self {
        Self {
            offset: Some(offset),
            detections,
        }
    }
}

/// A feed record that could not be decoded into a frame.
///
/// Sources return this (inside `anyhow::Error`) for bad records they have
/// already consumed, so the caller may skip it and keep reading. Any other
/// error from a source means the feed itself is broken.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MalformedFrame {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for MalformedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "detections feed line {}: {}", self.line, self.message)
    }
}
impl std::error::Error for MalformedFrame {}

/// Source of per-frame detections.
///
/// This is the seam to the external object detector. Implementations hand over
/// one frame's detections per call, in arrival order, and keep no state that
/// the occupancy engine depends on.
pub trait DetectionSource {
    /// Source identifier for logs.
    fn name(&self) -> &'static str;

    /// Next frame of detections, or `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<DetectionFrame>>;

    /// Like `next_frame`, but logs and skips malformed records.
    fn next_valid_frame(&mut self) -> Result<Option<DetectionFrame>> {
        loop {
            match self.next_frame() {
                Err(e) if e.downcast_ref::<MalformedFrame>().is_some() => {
                    log::warn!("skipping {}", e);
                }
                other => return other,
            }
        }
    }
}

impl<S: DetectionSource + ?Sized> DetectionSource for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn next_frame(&mut self) -> Result<Option<DetectionFrame>> {
        (**self).next_frame()
    }
}
