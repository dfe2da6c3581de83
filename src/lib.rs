//! Zone occupancy engine.
//!
//! Turns a stream of per-frame object detections into a debounced per-zone
//! occupancy signal, published as a small JSON snapshot for an external display.
//!
//! # Pipeline
//!
//! 1. **Assignment**: each allow-listed detection's bounding-box center is given
//!    to the first zone (registry order) whose polygon contains it.
//! 2. **Hysteresis**: every zone runs CLEAR → CANDIDATE → OCCUPIED with
//!    asymmetric thresholds, so brief misses do not flicker the output and
//!    pass-through motion never marks a zone occupied.
//! 3. **Publish**: a snapshot of counts and stable states is written atomically,
//!    at most once per write interval.
//!
//! # Module Structure
//!
//! - `geometry`: containment, rescaling, zone masks
//! - `zones`: zone definitions and the registry
//! - `detect`: detection types, class filter, detection sources
//! - `assign`: detection-to-zone assignment
//! - `occupancy`: per-zone hysteresis and the engine that owns it
//! - `snapshot`: output payload and the rate-limited writer
//! - `pipeline`: one frame cycle wiring the above together
//! - `config`: file + environment configuration

pub mod assign;
pub mod config;
pub mod detect;
pub mod geometry;
pub mod occupancy;
pub mod pipeline;
pub mod snapshot;
pub mod zones;

pub use assign::{assign_detections, FrameAssignment, ZoneCounts};
pub use config::OccupancyConfig;
pub use detect::{
    BBox, ClassFilter, Detection, DetectionFrame, DetectionSource, JsonLinesSource,
    MalformedFrame, ScriptedSource,
};
pub use geometry::{build_zone_mask, point_in_polygon, rescale_zone, ImageSize, Point, ZoneMask};
pub use occupancy::{OccupancyEngine, OccupancyState, Thresholds, Transition, ZoneTracking};
pub use pipeline::{FrameClock, FrameReport, OccupancyPipeline};
pub use snapshot::{
    OccupancySnapshot, PublishOutcome, SnapshotPublisher, ZoneSnapshot, DEFAULT_WRITE_INTERVAL,
};
pub use zones::{Zone, ZoneRegistry};
