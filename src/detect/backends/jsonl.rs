//! JSON-lines detection feed.
//!
//! Each non-blank line carries one frame:
//!
//! ```json
//! {"t": 1.25, "detections": [{"class_name": "person", "confidence": 0.91, "bbox": [10, 20, 110, 220]}]}
//! ```
//!
//! `t` is the capture offset in seconds and may be omitted. A missing or `null`
//! `detections` field means the detector saw nothing in that frame.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use crate::detect::backend::{DetectionFrame, DetectionSource, MalformedFrame};
use crate::detect::result::Detection;

#[derive(Debug, Deserialize)]
struct FrameLine {
    #[serde(default)]
    t: Option<f64>,
    #[serde(default)]
    detections: Option<Vec<Detection>>,
}

/// Reads frames from any buffered reader, one JSON object per line.
pub struct JsonLinesSource<R> {
    reader: R,
    line_no: usize,
    buf: String,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
        }
    }

    /// Number of lines consumed so far, blank lines included.
    pub fn line_no(&self) -> usize {
        self.line_no
    }
}

impl JsonLinesSource<Box<dyn BufRead>> {
    /// Open a feed from a file path, or from stdin when `path` is `-`.
    pub fn open(path: &Path) -> Result<Self> {
        let reader: Box<dyn BufRead> = if path.as_os_str() == "-" {
            Box::new(std::io::stdin().lock())
        } else {
            let file = File::open(path).map_err(|e| {
                anyhow!("failed to open detections feed {}: {}", path.display(), e)
            })?;
            Box::new(BufReader::new(file))
        };
        Ok(Self::new(reader))
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<DetectionFrame, MalformedFrame> {
    let malformed = |message: String| MalformedFrame {
        line: line_no,
        message,
    };
    let parsed: FrameLine = serde_json::from_str(line).map_err(|e| malformed(e.to_string()))?;
    let offset = match parsed.t {
        Some(t) if !t.is_finite() || t < 0.0 => {
            return Err(malformed(format!(
                "t must be a non-negative number of seconds (got {})",
                t
            )));
        }
        Some(t) => {
            let offset = Duration::try_from_secs_f64(t)
                .map_err(|e| malformed(format!("t is out of range (got {}): {}", t, e)))?;
            Some(offset)
        }
        None => None,
    };
    Ok(DetectionFrame {
        offset,
        detections: parsed.detections.unwrap_or_default(),
    })
}

impl<R: BufRead> DetectionSource for JsonLinesSource<R> {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn next_frame(&mut self) -> Result<Option<DetectionFrame>> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_line(&mut self.buf)
                .map_err(|e| anyhow!("detections feed read failed: {}", e))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }
            return Ok(Some(parse_line(line, self.line_no)?));
        }
    }
}
