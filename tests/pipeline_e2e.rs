//! End-to-end runs of the occupancy pipeline over scripted detection feeds.
//!
//! Time is virtual: each frame's instant is `t0 + offset`, so hysteresis and
//! rate limiting are exercised deterministically.

use std::io::Cursor;
use std::path::Path;
use std::time::{Duration, Instant, UNIX_EPOCH};

use zone_occupancy::snapshot::read_snapshot;
use zone_occupancy::{
    BBox, ClassFilter, Detection, DetectionFrame, DetectionSource, ImageSize, JsonLinesSource,
    OccupancyPipeline, OccupancyState, ScriptedSource, SnapshotPublisher, Thresholds,
    ZoneRegistry,
};

const ZONES_JSON: &str = r#"{
    "image_size": {"width": 640, "height": 480},
    "zones": [
        {"id": "table_1", "points": [[0, 0], [320, 0], [320, 240], [0, 240]]},
        {"id": "table_2", "points": [[320, 0], [640, 0], [640, 240], [320, 240]]},
        {"id": "broken", "points": [[0, 0], [10, 10]]}
    ]
}"#;

fn write_zones(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("zones.json");
    std::fs::write(&path, ZONES_JSON).expect("write zones");
    path
}

fn person_at(cx: f32, cy: f32) -> Detection {
    Detection::new(
        "person",
        0.9,
        BBox::new(cx - 20.0, cy - 40.0, cx + 20.0, cy + 40.0),
    )
}

fn build_pipeline(dir: &Path, frame: ImageSize, t0: Instant) -> OccupancyPipeline {
    let zones = ZoneRegistry::load(&write_zones(dir)).expect("load zones");
    assert_eq!(zones.len(), 2);
    OccupancyPipeline::new(
        &zones,
        frame,
        ClassFilter::default(),
        Thresholds::default(),
        SnapshotPublisher::new(dir.join("occupancy.json"), Duration::from_millis(500)),
        Some("lib_1".to_string()),
        t0,
    )
    .expect("pipeline")
}

fn run(
    pipeline: &mut OccupancyPipeline,
    source: &mut dyn DetectionSource,
    t0: Instant,
) -> Vec<(Duration, String, bool)> {
    let mut transitions = Vec::new();
    while let Some(frame) = source.next_valid_frame().expect("frame") {
        let offset = frame.offset.expect("scripted frames carry offsets");
        let report = pipeline.process_frame(
            &frame.detections,
            t0 + offset,
            UNIX_EPOCH + Duration::from_secs(1_700_000_000) + offset,
        );
        assert!(report.publish_error.is_none());
        for t in report.transitions {
            transitions.push((t.at - t0, t.zone_id, t.occupied));
        }
    }
    transitions
}

#[test]
fn occupancy_latches_and_clears_with_rescaled_zones() {
    let dir = tempfile::tempdir().expect("tempdir");
    let t0 = Instant::now();
    // Live frames are twice the authored size.
    let mut pipeline = build_pipeline(dir.path(), ImageSize::new(1280, 960), t0);

    let mut source = ScriptedSource::default();
    // A person sits at table_1 for 7s (frames every 250ms).
    for i in 0..=28u64 {
        source.push(DetectionFrame::at(
            Duration::from_millis(i * 250),
            vec![person_at(300.0, 200.0)],
        ));
    }
    // Then leaves for good.
    for i in 29..=48u64 {
        source.push(DetectionFrame::at(Duration::from_millis(i * 250), vec![]));
    }

    let transitions = run(&mut pipeline, &mut source, t0);
    assert_eq!(
        transitions,
        vec![
            (Duration::from_millis(5000), "table_1".to_string(), true),
            (Duration::from_millis(10_000), "table_1".to_string(), false),
        ]
    );
    assert_eq!(
        pipeline.engine().state("table_2"),
        Some(OccupancyState::Clear)
    );

    let snapshot = read_snapshot(&dir.path().join("occupancy.json")).expect("snapshot");
    assert_eq!(snapshot.room_id.as_deref(), Some("lib_1"));
    assert_eq!(snapshot.zones.len(), 2);
    assert!(!snapshot.zones[0].occupied);
    // 49 frames over 12s at one write per 500ms.
    assert_eq!(pipeline.publisher().writes(), 25);
}

#[test]
fn snapshot_reports_counts_and_state_mid_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let t0 = Instant::now();
    let mut pipeline = build_pipeline(dir.path(), ImageSize::new(640, 480), t0);

    let mut source = ScriptedSource::default();
    for i in 0..=12u64 {
        source.push(DetectionFrame::at(
            Duration::from_millis(i * 500),
            vec![
                person_at(100.0, 100.0),
                person_at(200.0, 120.0),
                Detection::new("laptop", 0.8, BBox::new(400.0, 50.0, 500.0, 150.0)),
                Detection::new("dog", 0.99, BBox::new(400.0, 50.0, 500.0, 150.0)),
                person_at(100.0, 400.0),
            ],
        ));
    }
    let transitions = run(&mut pipeline, &mut source, t0);
    assert_eq!(transitions.len(), 2);
    assert!(transitions.iter().all(|(at, _, occ)| *occ && *at == Duration::from_secs(5)));

    let snapshot = read_snapshot(&dir.path().join("occupancy.json")).expect("snapshot");
    assert_eq!(snapshot.updated_at, 1_700_000_006.0);
    let t1 = snapshot.zone("table_1").expect("table_1");
    assert_eq!(t1.person_count, 2);
    assert!(t1.item_counts.values().all(|&c| c == 0));
    assert!(t1.occupied);
    let t2 = snapshot.zone("table_2").expect("table_2");
    assert_eq!(t2.person_count, 0);
    assert_eq!(t2.item_counts["laptop"], 1);
    assert!(!t2.item_counts.contains_key("dog"));
    assert!(t2.occupied);
}

#[test]
fn json_lines_feed_drives_pipeline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let t0 = Instant::now();
    let mut pipeline = build_pipeline(dir.path(), ImageSize::new(640, 480), t0);

    let mut feed = String::new();
    for i in 0..=20u64 {
        let t = i as f64 * 0.5;
        if (2.0..=4.0).contains(&t) {
            // Detector dropout shorter than the grace window.
            feed.push_str(&format!("{{\"t\": {}, \"detections\": null}}\n", t));
        } else {
            feed.push_str(&format!(
                concat!(
                    "{{\"t\": {}, \"detections\": [{{\"class_name\": \"person\", ",
                    "\"confidence\": 0.7, \"bbox\": [420, 60, 500, 200]}}]}}\n"
                ),
                t
            ));
        }
    }
    let mut source = JsonLinesSource::new(Cursor::new(feed));
    let transitions = run(&mut pipeline, &mut source, t0);

    assert_eq!(
        transitions,
        vec![(Duration::from_secs(5), "table_2".to_string(), true)]
    );
    let tracking = pipeline.engine().tracking("table_2").expect("tracking");
    assert_eq!(tracking.first_detected_time, Some(t0));
    assert_eq!(tracking.last_detected_time, Some(t0 + Duration::from_secs(10)));
}

#[test]
fn malformed_feed_lines_are_skipped_without_ending_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let t0 = Instant::now();
    let mut pipeline = build_pipeline(dir.path(), ImageSize::new(640, 480), t0);

    let person = r#"[{"class_name": "person", "confidence": 0.7, "bbox": [100, 60, 180, 200]}]"#;
    let mut feed = String::new();
    for i in 0..=12u64 {
        let t = i as f64 * 0.5;
        feed.push_str(&format!("{{\"t\": {}, \"detections\": {}}}\n", t, person));
        if i == 3 {
            feed.push_str("{oops\n");
        }
        if i == 7 {
            feed.push_str("{\"t\": 1e20}\n");
        }
    }
    let mut source = JsonLinesSource::new(Cursor::new(feed));
    let transitions = run(&mut pipeline, &mut source, t0);

    assert_eq!(
        transitions,
        vec![(Duration::from_secs(5), "table_1".to_string(), true)]
    );
    assert_eq!(pipeline.frames_processed(), 13);
    let snapshot = read_snapshot(&dir.path().join("occupancy.json")).expect("snapshot");
    assert_eq!(snapshot.updated_at, 1_700_000_006.0);
}
