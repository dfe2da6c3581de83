//! Per-zone occupancy hysteresis.
//!
//! Each zone runs an independent debounce machine over the per-frame
//! "something was assigned here" flag:
//!
//! ```text
//!            detected                  detected for >= occupied threshold
//!   CLEAR ------------> CANDIDATE ----------------------------------> OCCUPIED
//!     ^                     |                                            |
//!     |   clear for >= unoccupied threshold                               |
//!     +---------------------+--------------------------------------------+
//! ```
//!
//! Short drop-outs (shorter than the unoccupied threshold) neither reset a
//! candidate run nor clear an occupied zone. Time is always passed in by the
//! caller; nothing here reads a clock.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::assign::FrameAssignment;

pub const DEFAULT_OCCUPIED_SECS: f64 = 5.0;
pub const DEFAULT_UNOCCUPIED_SECS: f64 = 3.0;

/// Debounce thresholds shared by every zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thresholds {
    /// Continuous detection required before a zone becomes occupied.
    pub occupied: Duration,
    /// Continuous absence required before a run is abandoned.
    pub unoccupied: Duration,
}

impl Thresholds {
    pub fn new(occupied: Duration, unoccupied: Duration) -> Self {
        Self {
            occupied,
            unoccupied,
        }
    }

    pub fn from_secs(occupied: f64, unoccupied: f64) -> Result<Self> {
        Ok(Self::new(
            secs_to_duration("occupied threshold", occupied)?,
            secs_to_duration("unoccupied threshold", unoccupied)?,
        ))
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::new(
            Duration::from_secs_f64(DEFAULT_OCCUPIED_SECS),
            Duration::from_secs_f64(DEFAULT_UNOCCUPIED_SECS),
        )
    }
}

fn secs_to_duration(name: &str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(anyhow!(
            "{} must be a non-negative number of seconds (got {})",
            name,
            secs
        ));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| anyhow!("{} is out of range (got {}): {}", name, secs, e))
}

/// Externally meaningful view of a zone's hysteresis state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccupancyState {
    Clear,
    Candidate,
    Occupied,
}

impl std::fmt::Display for OccupancyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OccupancyState::Clear => "CLEAR",
            OccupancyState::Candidate => "CANDIDATE",
            OccupancyState::Occupied => "OCCUPIED",
        };
        f.write_str(s)
    }
}

/// Hysteresis record for one zone.
///
/// `first_detected_time` is set exactly while a detection run is unresolved:
/// it starts on the first detection from a clear state and is dropped once the
/// zone has been clear for the unoccupied threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneTracking {
    pub currently_detected: bool,
    pub first_detected_time: Option<Instant>,
    pub last_detected_time: Option<Instant>,
    pub stable_occupied: bool,
    pub last_state_change: Instant,
}

/// A flip of `stable_occupied` produced by one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateChange {
    pub occupied: bool,
    /// Detection run length (when becoming occupied) or clear time (when becoming free).
    pub after: Duration,
}

impl ZoneTracking {
    pub fn new(now: Instant) -> Self {
        Self {
            currently_detected: false,
            first_detected_time: None,
            last_detected_time: None,
            stable_occupied: false,
            last_state_change: now,
        }
    }

    pub fn state(&self) -> OccupancyState {
        if self.stable_occupied {
            OccupancyState::Occupied
        } else if self.first_detected_time.is_some() {
            OccupancyState::Candidate
        } else {
            OccupancyState::Clear
        }
    }

    /// Length of the current detection run at `now`, if one is open.
    pub fn run_duration(&self, now: Instant) -> Option<Duration> {
        self.first_detected_time
            .map(|first| now.saturating_duration_since(first))
    }

    /// Advance by one frame. Returns the flip, if this frame caused one.
    pub fn step(
        &mut self,
        detected: bool,
        now: Instant,
        thresholds: &Thresholds,
    ) -> Option<StateChange> {
        self.currently_detected = detected;

        if detected {
            let first = *self.first_detected_time.get_or_insert(now);
            self.last_detected_time = Some(now);
            let run = now.saturating_duration_since(first);
            if run >= thresholds.occupied && !self.stable_occupied {
                self.stable_occupied = true;
                self.last_state_change = now;
                return Some(StateChange {
                    occupied: true,
                    after: run,
                });
            }
            return None;
        }

        if self.first_detected_time.is_none() {
            return None;
        }
        let last = self.last_detected_time.unwrap_or(now);
        let clear = now.saturating_duration_since(last);
        if clear < thresholds.unoccupied {
            return None;
        }

        self.first_detected_time = None;
        self.last_detected_time = None;
        if self.stable_occupied {
            self.stable_occupied = false;
            self.last_state_change = now;
            return Some(StateChange {
                occupied: false,
                after: clear,
            });
        }
        None
    }

    /// Pure form of [`ZoneTracking::step`].
    pub fn advanced(mut self, detected: bool, now: Instant, thresholds: &Thresholds) -> Self {
        self.step(detected, now, thresholds);
        self
    }
}

/// A zone's stable occupancy flipped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub zone_id: String,
    pub occupied: bool,
    pub after: Duration,
    pub at: Instant,
}

/// Owns the hysteresis state of every zone.
///
/// All mutation goes through `update` (a whole frame) or `update_zone`.
/// Frames must be fed in arrival order.
#[derive(Clone, Debug)]
pub struct OccupancyEngine {
    thresholds: Thresholds,
    order: Vec<String>,
    trackers: HashMap<String, ZoneTracking>,
}

impl OccupancyEngine {
    pub fn new<I, S>(zone_ids: I, thresholds: Thresholds, now: Instant) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order = Vec::new();
        let mut trackers = HashMap::new();
        for id in zone_ids {
            let id = id.into();
            if trackers.insert(id.clone(), ZoneTracking::new(now)).is_none() {
                order.push(id);
            }
        }
        Self {
            thresholds,
            order,
            trackers,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn zone_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn tracking(&self, zone_id: &str) -> Option<&ZoneTracking> {
        self.trackers.get(zone_id)
    }

    pub fn state(&self, zone_id: &str) -> Option<OccupancyState> {
        self.tracking(zone_id).map(ZoneTracking::state)
    }

    pub fn is_occupied(&self, zone_id: &str) -> bool {
        self.tracking(zone_id).is_some_and(|t| t.stable_occupied)
    }

    pub fn occupied_count(&self) -> usize {
        self.trackers.values().filter(|t| t.stable_occupied).count()
    }

    /// Advance every zone by one frame.
    ///
    /// Zones missing from `assignment` count as not detected.
    pub fn update(&mut self, assignment: &FrameAssignment, now: Instant) -> Vec<Transition> {
        let detected: HashSet<&str> = assignment
            .zones
            .iter()
            .filter(|z| z.detected)
            .map(|z| z.id.as_str())
            .collect();

        let mut transitions = Vec::new();
        for id in &self.order {
            let Some(tracking) = self.trackers.get_mut(id) else {
                continue;
            };
            if let Some(change) =
                tracking.step(detected.contains(id.as_str()), now, &self.thresholds)
            {
                transitions.push(log_transition(id, change, now));
            }
        }
        transitions
    }

    /// Advance a single zone by one frame.
    pub fn update_zone(
        &mut self,
        zone_id: &str,
        detected: bool,
        now: Instant,
    ) -> Result<Option<Transition>> {
        let thresholds = self.thresholds;
        let tracking = self
            .trackers
            .get_mut(zone_id)
            .ok_or_else(|| anyhow!("unknown zone {}", zone_id))?;
        Ok(tracking
            .step(detected, now, &thresholds)
            .map(|change| log_transition(zone_id, change, now)))
    }
}

fn log_transition(zone_id: &str, change: StateChange, now: Instant) -> Transition {
    if change.occupied {
        log::info!(
            "zone {} marked as OCCUPIED after {:.1}s",
            zone_id,
            change.after.as_secs_f64()
        );
    } else {
        log::info!(
            "zone {} marked as UNOCCUPIED after {:.1}s clear",
            zone_id,
            change.after.as_secs_f64()
        );
    }
    Transition {
        zone_id: zone_id.to_string(),
        occupied: change.occupied,
        after: change.after,
        at: now,
    }
}
