use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Axis-aligned bounding box in frame pixels. Serialized as `[x1, y1, x2, y2]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Integer midpoint. Corners are truncated to whole pixels first.
    pub fn center(&self) -> Point {
        // Float casts saturate; summing in i64 keeps the midpoint in i32 range.
        let (x1, y1, x2, y2) = (
            self.x1 as i32 as i64,
            self.y1 as i32 as i64,
            self.x2 as i32 as i64,
            self.y2 as i32 as i64,
        );
        Point::new(((x1 + x2) / 2) as i32, ((y1 + y2) / 2) as i32)
    }
}

impl From<[f32; 4]> for BBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// One detector output for one object in one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BBox,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, confidence: f32, bbox: BBox) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            bbox,
        }
    }

    /// Representative point used for zone assignment.
    pub fn center(&self) -> Point {
        self.bbox.center()
    }
}
