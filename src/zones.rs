//! Zone registry.
//!
//! Zones are authored once by an external annotation tool and loaded at startup
//! from a JSON file of the form:
//!
//! ```json
//! {
//!   "image_size": { "width": 1280, "height": 720 },
//!   "zones": [ { "id": "table_1", "points": [[10, 10], [200, 10], [200, 150]] } ]
//! }
//! ```
//!
//! Registry order is significant: detection assignment gives priority to the
//! earliest zone that contains a detection.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::geometry::{rescale_zone, ImageSize, Point};

/// Minimum number of vertices for a usable zone polygon.
pub const MIN_ZONE_POINTS: usize = 3;

/// A named polygonal zone in pixel coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub points: Vec<Point>,
}

#[derive(Debug, Deserialize)]
struct ZoneFile {
    #[serde(default)]
    image_size: Option<ImageSize>,
    #[serde(default)]
    zones: Vec<Zone>,
}

/// Zone ids are free-form labels; only blank ids are rejected.
pub fn validate_zone_id(zone_id: &str) -> Result<()> {
    if zone_id.trim().is_empty() {
        return Err(anyhow!("zone id must not be empty"));
    }
    Ok(())
}

/// Ordered, validated set of zones plus the image size they are expressed in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneRegistry {
    image_size: Option<ImageSize>,
    zones: Vec<Zone>,
}

impl ZoneRegistry {
    /// Build a registry, skipping malformed zones with a warning.
    ///
    /// A zone is skipped when its id is blank or already taken, or when it has
    /// fewer than `MIN_ZONE_POINTS` vertices.
    pub fn new(image_size: Option<ImageSize>, zones: Vec<Zone>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(zones.len());
        for zone in zones {
            if let Err(e) = validate_zone_id(&zone.id) {
                log::warn!("skipping zone: {}", e);
                continue;
            }
            if zone.points.len() < MIN_ZONE_POINTS {
                log::warn!(
                    "skipping zone {}: polygon has {} points, need at least {}",
                    zone.id,
                    zone.points.len(),
                    MIN_ZONE_POINTS
                );
                continue;
            }
            if !seen.insert(zone.id.clone()) {
                log::warn!("skipping zone {}: duplicate id", zone.id);
                continue;
            }
            kept.push(zone);
        }
        Self {
            image_size,
            zones: kept,
        }
    }

    /// Load zone definitions from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read zones file {}: {}", path.display(), e))?;
        Self::from_json(&raw)
            .map_err(|e| anyhow!("invalid zones file {}: {}", path.display(), e))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: ZoneFile = serde_json::from_str(raw)?;
        let registry = Self::new(file.image_size, file.zones);
        log::debug!(
            "loaded {} zones (authored at {})",
            registry.len(),
            registry
                .image_size
                .map(|s| s.to_string())
                .unwrap_or_else(|| "frame size".to_string())
        );
        Ok(registry)
    }

    /// Image size the zone coordinates are expressed in, if recorded.
    pub fn image_size(&self) -> Option<ImageSize> {
        self.image_size
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn get(&self, id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.zones.iter().map(|z| z.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Registry expressed in `frame` coordinates.
    ///
    /// Zones pass through unchanged when no authored size is recorded or when it
    /// already equals the frame size.
    pub fn scaled_for(&self, frame: ImageSize) -> Self {
        let zones = match self.image_size {
            Some(src) if src != frame => {
                log::info!("rescaling {} zones from {} to {}", self.len(), src, frame);
                self.zones
                    .iter()
                    .map(|z| rescale_zone(z, src, frame))
                    .collect()
            }
            _ => self.zones.clone(),
        };
        Self {
            image_size: Some(frame),
            zones,
        }
    }
}
