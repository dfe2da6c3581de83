//! One synchronous frame cycle: assignment, hysteresis, snapshot, publish.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant, SystemTime};

use crate::assign::{assign_detections, FrameAssignment};
use crate::config::OccupancyConfig;
use crate::detect::{ClassFilter, Detection};
use crate::geometry::{build_zone_mask, ImageSize, ZoneMask};
use crate::occupancy::{OccupancyEngine, Thresholds, Transition};
use crate::snapshot::{OccupancySnapshot, PublishOutcome, SnapshotPublisher};
use crate::zones::ZoneRegistry;

/// What one frame produced.
#[derive(Debug)]
pub struct FrameReport {
    pub assignment: FrameAssignment,
    pub transitions: Vec<Transition>,
    pub snapshot: OccupancySnapshot,
    pub published: bool,
    /// Set when a due write failed. The next frame retries.
    pub publish_error: Option<String>,
}

pub struct OccupancyPipeline {
    zones: ZoneRegistry,
    filter: ClassFilter,
    engine: OccupancyEngine,
    publisher: SnapshotPublisher,
    room_id: Option<String>,
    mask: ZoneMask,
    frames: u64,
}

impl OccupancyPipeline {
    /// `zones` are rescaled to `frame_size` here, once.
    pub fn new(
        zones: &ZoneRegistry,
        frame_size: ImageSize,
        filter: ClassFilter,
        thresholds: Thresholds,
        publisher: SnapshotPublisher,
        room_id: Option<String>,
        now: Instant,
    ) -> Result<Self> {
        if zones.is_empty() {
            return Err(anyhow!("no usable zones; nothing to monitor"));
        }
        let zones = zones.scaled_for(frame_size);
        let engine = OccupancyEngine::new(zones.ids(), thresholds, now);
        let mask = build_zone_mask(frame_size.width, frame_size.height, zones.zones());
        log::info!(
            "monitoring {} zones on {} frames ({:.1}% of frame under zones)",
            zones.len(),
            frame_size,
            mask.coverage() * 100.0
        );
        Ok(Self {
            zones,
            filter,
            engine,
            publisher,
            room_id,
            mask,
            frames: 0,
        })
    }

    pub fn from_config(cfg: &OccupancyConfig, zones: &ZoneRegistry, now: Instant) -> Result<Self> {
        Self::new(
            zones,
            cfg.frame_size,
            cfg.class_filter()?,
            cfg.thresholds()?,
            SnapshotPublisher::new(&cfg.output_path, cfg.write_interval),
            cfg.room_id.clone(),
            now,
        )
    }

    /// Zones in frame coordinates.
    pub fn zones(&self) -> &ZoneRegistry {
        &self.zones
    }

    /// Union of zone areas, for blanking frames before they reach the detector.
    pub fn zone_mask(&self) -> &ZoneMask {
        &self.mask
    }

    pub fn engine(&self) -> &OccupancyEngine {
        &self.engine
    }

    pub fn publisher(&self) -> &SnapshotPublisher {
        &self.publisher
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// Process one frame. `now` drives hysteresis and rate limiting; `wall` stamps the snapshot.
    ///
    /// Snapshot write failures are logged and reported, never returned as errors.
    pub fn process_frame(
        &mut self,
        detections: &[Detection],
        now: Instant,
        wall: SystemTime,
    ) -> FrameReport {
        self.frames += 1;
        let assignment = assign_detections(detections, self.zones.zones(), &self.filter);
        let transitions = self.engine.update(&assignment, now);
        let snapshot =
            OccupancySnapshot::build(self.room_id.as_deref(), &assignment, &self.engine, wall);

        let (published, publish_error) = match self.publisher.maybe_publish(&snapshot, now) {
            Ok(PublishOutcome::Written) => (true, None),
            Ok(PublishOutcome::Skipped) => (false, None),
            Err(e) => {
                log::error!("{}", e);
                (false, Some(e.to_string()))
            }
        };

        log::debug!(
            "frame {}: {} detections, {} filtered, {} outside zones, {} occupied",
            self.frames,
            detections.len(),
            assignment.filtered,
            assignment.unassigned,
            self.engine.occupied_count()
        );

        FrameReport {
            assignment,
            transitions,
            snapshot,
            published,
            publish_error,
        }
    }

    /// Write the latest state now, bypassing the rate limit.
    pub fn publish_now(&mut self, last: &OccupancySnapshot, now: Instant) -> Result<()> {
        self.publisher.publish_now(last, now)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ClockMode {
    /// Frame times are `start + offset` from the feed.
    Offsets,
    /// Frame times are taken on arrival.
    Arrival,
}

/// Assigns frame times for a whole run from a single clock.
///
/// The first frame decides the clock: feed offsets when it carries one,
/// arrival time otherwise. Later frames that disagree are rejected. Times never
/// go backwards; an earlier offset is held at the previous frame's time.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    wall_start: SystemTime,
    mode: Option<ClockMode>,
    last: Instant,
}

impl FrameClock {
    pub fn new(start: Instant, wall_start: SystemTime) -> Self {
        Self {
            start,
            wall_start,
            mode: None,
            last: start,
        }
    }

    /// Time of the most recently stamped frame.
    pub fn last(&self) -> Instant {
        self.last
    }

    /// True once the run is driven by feed offsets.
    pub fn uses_offsets(&self) -> bool {
        self.mode == Some(ClockMode::Offsets)
    }

    /// Monotonic and wall time for a frame with the given feed offset.
    pub fn stamp(&mut self, offset: Option<Duration>) -> Result<(Instant, SystemTime)> {
        let frame_mode = if offset.is_some() {
            ClockMode::Offsets
        } else {
            ClockMode::Arrival
        };
        let mode = *self.mode.get_or_insert(frame_mode);
        if mode != frame_mode {
            return Err(anyhow!(
                "frame {} a `t` offset but the run started {}",
                if offset.is_some() { "has" } else { "lacks" },
                if mode == ClockMode::Offsets {
                    "with offsets"
                } else {
                    "without offsets"
                }
            ));
        }

        let (now, wall) = match offset {
            Some(offset) => (self.start + offset, self.wall_start + offset),
            None => (Instant::now(), SystemTime::now()),
        };
        if now < self.last {
            log::warn!("frame time went backwards; holding time at previous frame");
        }
        self.last = now.max(self.last);
        Ok((self.last, wall))
    }
}
