//! Pixel-space geometry for zones.
//!
//! - `point_in_polygon`: boundary-inclusive containment for simple polygons.
//! - `rescale_zone`: maps zone vertices from the authored image size to the live frame size.
//! - `build_zone_mask`: single-channel raster marking the union of all zones.
//!
//! All coordinates are integer pixels. Containment is computed with exact `i64`
//! arithmetic, so results do not depend on floating point rounding.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::zones::Zone;

/// Mask value for pixels inside at least one zone.
pub const MASK_ACTIVE: u8 = 255;
/// Mask value for pixels outside every zone.
pub const MASK_INACTIVE: u8 = 0;

/// Integer pixel coordinate. Serialized as `[x, y]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [i32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Frame or authoring image dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Returns true when `point` lies inside `polygon` or on its boundary.
///
/// Polygons with fewer than 3 vertices contain nothing. The polygon is
/// implicitly closed. Results for self-intersecting polygons follow the
/// even-odd rule and are not otherwise meaningful.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let px = i64::from(point.x);
    let py = i64::from(point.y);
    let mut inside = false;
    let mut j = n - 1;

    for i in 0..n {
        let (xi, yi) = (i64::from(polygon[i].x), i64::from(polygon[i].y));
        let (xj, yj) = (i64::from(polygon[j].x), i64::from(polygon[j].y));

        if on_segment(px, py, xi, yi, xj, yj) {
            return true;
        }

        if (yi > py) != (yj > py) {
            // px < xi + (py - yi) * (xj - xi) / (yj - yi), without the division.
            let lhs = (px - xi) * (yj - yi);
            let rhs = (py - yi) * (xj - xi);
            let left_of_edge = if yj > yi { lhs < rhs } else { lhs > rhs };
            if left_of_edge {
                inside = !inside;
            }
        }
        j = i;
    }

    inside
}

fn on_segment(px: i64, py: i64, ax: i64, ay: i64, bx: i64, by: i64) -> bool {
    let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
    cross == 0
        && px >= ax.min(bx)
        && px <= ax.max(bx)
        && py >= ay.min(by)
        && py <= ay.max(by)
}

/// Rescale a zone authored against `src` onto a frame of size `dst`.
///
/// X and Y scale independently; vertices are rounded to the nearest integer
/// (ties to even). A zero source dimension is treated as 1.
pub fn rescale_zone(zone: &Zone, src: ImageSize, dst: ImageSize) -> Zone {
    if src == dst {
        return zone.clone();
    }
    let sx = f64::from(dst.width) / f64::from(src.width.max(1));
    let sy = f64::from(dst.height) / f64::from(src.height.max(1));
    let points = zone
        .points
        .iter()
        .map(|p| {
            Point::new(
                (f64::from(p.x) * sx).round_ties_even() as i32,
                (f64::from(p.y) * sy).round_ties_even() as i32,
            )
        })
        .collect();
    Zone {
        id: zone.id.clone(),
        points,
    }
}

/// Single-channel raster covering the union of all zones.
///
/// Row-major, one byte per pixel: `MASK_ACTIVE` inside any zone, `MASK_INACTIVE` elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneMask {
    size: ImageSize,
    data: Vec<u8>,
}

/// Build the zone mask for a `width` x `height` frame.
pub fn build_zone_mask(width: u32, height: u32, zones: &[Zone]) -> ZoneMask {
    let size = ImageSize::new(width, height);
    let mut data = vec![MASK_INACTIVE; size.pixel_count()];
    if width == 0 || height == 0 {
        return ZoneMask { size, data };
    }

    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;
    for zone in zones {
        let Some((min, max)) = bounding_box(&zone.points) else {
            continue;
        };
        let x0 = i64::from(min.x).clamp(0, max_x);
        let x1 = i64::from(max.x).clamp(0, max_x);
        let y0 = i64::from(min.y).clamp(0, max_y);
        let y1 = i64::from(max.y).clamp(0, max_y);
        for y in y0..=y1 {
            let row = y as usize * width as usize;
            for x in x0..=x1 {
                let idx = row + x as usize;
                if data[idx] == MASK_ACTIVE {
                    continue;
                }
                if point_in_polygon(Point::new(x as i32, y as i32), &zone.points) {
                    data[idx] = MASK_ACTIVE;
                }
            }
        }
    }

    ZoneMask { size, data }
}

fn bounding_box(points: &[Point]) -> Option<(Point, Point)> {
    let first = *points.first()?;
    let (min, max) = points.iter().fold((first, first), |(lo, hi), p| {
        (
            Point::new(lo.x.min(p.x), lo.y.min(p.y)),
            Point::new(hi.x.max(p.x), hi.y.max(p.y)),
        )
    });
    Some((min, max))
}

impl ZoneMask {
    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns false for coordinates outside the raster.
    pub fn is_active(&self, x: u32, y: u32) -> bool {
        if x >= self.size.width || y >= self.size.height {
            return false;
        }
        self.data[y as usize * self.size.width as usize + x as usize] == MASK_ACTIVE
    }

    /// Fraction of active pixels, in `[0, 1]`.
    pub fn coverage(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let active = self.data.iter().filter(|&&v| v == MASK_ACTIVE).count();
        active as f64 / self.data.len() as f64
    }

    /// Blank every pixel of an interleaved frame that lies outside the mask.
    ///
    /// `pixels` must hold exactly `width * height * channels` bytes.
    pub fn apply(&self, pixels: &mut [u8], channels: usize) -> Result<()> {
        if channels == 0 {
            return Err(anyhow!("zone mask: channel count must be >= 1"));
        }
        let expected = self.size.pixel_count() * channels;
        if pixels.len() != expected {
            return Err(anyhow!(
                "zone mask: frame buffer has {} bytes, expected {} ({} x {} channels)",
                pixels.len(),
                expected,
                self.size,
                channels
            ));
        }
        for (pixel, &m) in pixels.chunks_exact_mut(channels).zip(self.data.iter()) {
            if m != MASK_ACTIVE {
                pixel.fill(0);
            }
        }
        Ok(())
    }

    #[cfg(feature = "mask-image")]
    pub fn to_gray_image(&self) -> Result<image::GrayImage> {
        image::GrayImage::from_raw(self.size.width, self.size.height, self.data.clone())
            .ok_or_else(|| anyhow!("zone mask: raster size mismatch"))
    }
}
