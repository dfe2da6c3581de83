//! Detection-to-zone assignment.
//!
//! Every allow-listed detection is reduced to its bounding-box center and given
//! to the first zone, in registry order, whose polygon contains that point.
//! A detection belongs to at most one zone. Overlapping zones are therefore
//! resolved by registry order alone; author zones without overlap to get
//! unambiguous counts. Centers outside every zone are dropped.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::detect::{ClassFilter, Detection};
use crate::geometry::point_in_polygon;
use crate::zones::Zone;

/// Per-zone tallies for one frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ZoneCounts {
    pub id: String,
    pub person_count: u32,
    /// Every allowed non-person class, zero when absent.
    pub item_counts: BTreeMap<String, u32>,
    /// True when at least one detection was assigned to this zone this frame.
    pub detected: bool,
}

impl ZoneCounts {
    fn empty(id: &str, filter: &ClassFilter) -> Self {
        Self {
            id: id.to_string(),
            person_count: 0,
            item_counts: filter.item_classes().map(|c| (c.to_string(), 0)).collect(),
            detected: false,
        }
    }

    pub fn item_total(&self) -> u32 {
        self.item_counts.values().sum()
    }
}

/// Result of assigning one frame's detections, one entry per zone in registry order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameAssignment {
    pub zones: Vec<ZoneCounts>,
    /// Allow-listed detections whose center fell outside every zone.
    pub unassigned: usize,
    /// Detections rejected by the class filter.
    pub filtered: usize,
}

impl FrameAssignment {
    pub fn get(&self, id: &str) -> Option<&ZoneCounts> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn is_detected(&self, id: &str) -> bool {
        self.get(id).is_some_and(|z| z.detected)
    }
}

/// Index of the first zone containing `det`'s center.
pub fn zone_for_detection(det: &Detection, zones: &[Zone]) -> Option<usize> {
    let center = det.center();
    zones
        .iter()
        .position(|zone| point_in_polygon(center, &zone.points))
}

/// Assign a frame's detections to zones.
///
/// Detections not accepted by `filter` are discarded before assignment.
pub fn assign_detections(
    detections: &[Detection],
    zones: &[Zone],
    filter: &ClassFilter,
) -> FrameAssignment {
    let mut out = FrameAssignment {
        zones: zones
            .iter()
            .map(|z| ZoneCounts::empty(&z.id, filter))
            .collect(),
        unassigned: 0,
        filtered: 0,
    };

    for det in detections {
        if !filter.accepts(det) {
            out.filtered += 1;
            continue;
        }
        let Some(idx) = zone_for_detection(det, zones) else {
            out.unassigned += 1;
            continue;
        };
        let counts = &mut out.zones[idx];
        counts.detected = true;
        if filter.is_person(&det.class_name) {
            counts.person_count += 1;
        } else {
            *counts
                .item_counts
                .entry(det.class_name.clone())
                .or_insert(0) += 1;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BBox;
    use crate::geometry::Point;

    fn rect(id: &str, x0: i32, y0: i32, x1: i32, y1: i32) -> Zone {
        Zone {
            id: id.to_string(),
            points: vec![
                Point::new(x0, y0),
                Point::new(x1, y0),
                Point::new(x1, y1),
                Point::new(x0, y1),
            ],
        }
    }

    fn det_at(class: &str, cx: f32, cy: f32) -> Detection {
        Detection::new(class, 0.9, BBox::new(cx - 2.0, cy - 2.0, cx + 2.0, cy + 2.0))
    }

    #[test]
    fn counts_people_and_items_per_zone() {
        let zones = vec![rect("a", 0, 0, 100, 100), rect("b", 200, 0, 300, 100)];
        let dets = vec![
            det_at("person", 50.0, 50.0),
            det_at("person", 60.0, 40.0),
            det_at("laptop", 250.0, 50.0),
            det_at("cup", 250.0, 60.0),
            det_at("cup", 255.0, 60.0),
        ];
        let out = assign_detections(&dets, &zones, &ClassFilter::default());

        let a = out.get("a").expect("zone a");
        assert_eq!(a.person_count, 2);
        assert_eq!(a.item_total(), 0);
        assert!(a.detected);

        let b = out.get("b").expect("zone b");
        assert_eq!(b.person_count, 0);
        assert_eq!(b.item_counts["laptop"], 1);
        assert_eq!(b.item_counts["cup"], 2);
        assert_eq!(b.item_counts["book"], 0);
        assert!(b.detected);
        assert_eq!(out.unassigned, 0);
    }

    #[test]
    fn first_matching_zone_wins() {
        let zones = vec![rect("a", 0, 0, 100, 100), rect("b", 50, 50, 150, 150)];
        let dets = vec![det_at("person", 75.0, 75.0)];
        let out = assign_detections(&dets, &zones, &ClassFilter::default());
        assert_eq!(out.get("a").unwrap().person_count, 1);
        assert_eq!(out.get("b").unwrap().person_count, 0);
        assert!(out.is_detected("a"));
        assert!(!out.is_detected("b"));

        let reversed = vec![zones[1].clone(), zones[0].clone()];
        let out = assign_detections(&dets, &reversed, &ClassFilter::default());
        assert_eq!(out.get("b").unwrap().person_count, 1);
        assert_eq!(out.get("a").unwrap().person_count, 0);
    }

    #[test]
    fn outside_and_filtered_detections_are_dropped() {
        let zones = vec![rect("a", 0, 0, 100, 100)];
        let dets = vec![
            det_at("person", 500.0, 500.0),
            det_at("dog", 50.0, 50.0),
            Detection::new("person", 0.05, BBox::new(40.0, 40.0, 60.0, 60.0)),
        ];
        let out = assign_detections(&dets, &zones, &ClassFilter::default());
        let a = out.get("a").unwrap();
        assert!(!a.detected);
        assert_eq!(a.person_count, 0);
        assert_eq!(out.unassigned, 1);
        assert_eq!(out.filtered, 2);
    }

    #[test]
    fn empty_frame_clears_every_zone() {
        let zones = vec![rect("a", 0, 0, 10, 10), rect("b", 20, 20, 30, 30)];
        let out = assign_detections(&[], &zones, &ClassFilter::default());
        assert_eq!(out.zones.len(), 2);
        assert!(out.zones.iter().all(|z| !z.detected && z.person_count == 0));
        assert_eq!(out.zones[0].item_counts.len(), 8);
    }

    #[test]
    fn item_only_detection_marks_zone() {
        let zones = vec![rect("a", 0, 0, 10, 10)];
        let dets = [det_at("backpack", 5.0, 5.0)];
        let out = assign_detections(&dets, &zones, &ClassFilter::default());
        assert!(out.is_detected("a"));
        assert_eq!(out.zones[0].person_count, 0);
        assert_eq!(out.zones[0].item_counts["backpack"], 1);
    }
}
