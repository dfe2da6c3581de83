//! Occupancy snapshot output.
//!
//! The snapshot file is the contract with the downstream display:
//!
//! ```json
//! {
//!   "room_id": "lib_1",
//!   "updated_at": 1712345678.25,
//!   "zones": [
//!     {"id": "table_1", "person_count": 1, "item_counts": {"cup": 0, "laptop": 1}, "occupied": true}
//!   ]
//! }
//! ```
//!
//! `room_id` is omitted when not configured. Writes go to a sibling temp file
//! which is then renamed over the target, so readers never see a partial file.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::assign::FrameAssignment;
use crate::occupancy::OccupancyEngine;

pub const DEFAULT_WRITE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub id: String,
    pub person_count: u32,
    pub item_counts: BTreeMap<String, u32>,
    pub occupied: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OccupancySnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// Seconds since the Unix epoch.
    pub updated_at: f64,
    pub zones: Vec<ZoneSnapshot>,
}

impl OccupancySnapshot {
    /// Combine this frame's counts with the engine's stable states.
    pub fn build(
        room_id: Option<&str>,
        assignment: &FrameAssignment,
        engine: &OccupancyEngine,
        wall: SystemTime,
    ) -> Self {
        let zones = assignment
            .zones
            .iter()
            .map(|counts| ZoneSnapshot {
                id: counts.id.clone(),
                person_count: counts.person_count,
                item_counts: counts.item_counts.clone(),
                occupied: engine.is_occupied(&counts.id),
            })
            .collect();
        Self {
            room_id: room_id.map(str::to_string),
            updated_at: unix_seconds(wall),
            zones,
        }
    }

    pub fn zone(&self, id: &str) -> Option<&ZoneSnapshot> {
        self.zones.iter().find(|z| z.id == id)
    }
}

/// Seconds since the Unix epoch; clocks before the epoch read as 0.
pub fn unix_seconds(wall: SystemTime) -> f64 {
    wall.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Written,
    /// Inside the rate-limit window since the last successful write.
    Skipped,
}

/// Rate-limited, atomic snapshot writer.
///
/// The interval is measured from the last *successful* write: a failed write
/// leaves the clock untouched so the next call retries.
#[derive(Debug)]
pub struct SnapshotPublisher {
    path: PathBuf,
    interval: Duration,
    last_write: Option<Instant>,
    writes: u64,
}

impl SnapshotPublisher {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last_write: None,
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_write(&self) -> Option<Instant> {
        self.last_write
    }

    /// Successful writes so far.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_write {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    /// Write `snapshot` unless the previous write is younger than the interval.
    pub fn maybe_publish(
        &mut self,
        snapshot: &OccupancySnapshot,
        now: Instant,
    ) -> Result<PublishOutcome> {
        if !self.is_due(now) {
            return Ok(PublishOutcome::Skipped);
        }
        self.publish_now(snapshot, now)?;
        Ok(PublishOutcome::Written)
    }

    /// Write `snapshot` immediately and restart the rate-limit window.
    pub fn publish_now(&mut self, snapshot: &OccupancySnapshot, now: Instant) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.path, &json).map_err(|e| {
            anyhow!(
                "failed to write occupancy snapshot {}: {}",
                self.path.display(),
                e
            )
        })?;
        self.last_write = Some(now);
        self.writes += 1;
        log::debug!(
            "wrote occupancy snapshot to {} ({} zones)",
            self.path.display(),
            snapshot.zones.len()
        );
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = temp_path_for(path);
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Read a snapshot file back. Used by tooling and tests.
pub fn read_snapshot(path: &Path) -> Result<OccupancySnapshot> {
    let raw = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read snapshot {}: {}", path.display(), e))?;
    let snapshot = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid snapshot {}: {}", path.display(), e))?;
    Ok(snapshot)
}
