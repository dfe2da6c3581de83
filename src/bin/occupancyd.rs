//! occupancyd - zone occupancy daemon
//!
//! This daemon:
//! 1. Loads zone polygons and rescales them to the live frame size
//! 2. Reads per-frame detections from a JSON-lines feed (file or stdin)
//! 3. Assigns detections to zones and debounces per-zone occupancy
//! 4. Writes the occupancy snapshot atomically, rate-limited

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use zone_occupancy::{
    DetectionSource, FrameClock, ImageSize, JsonLinesSource, OccupancyConfig, OccupancyPipeline,
    OccupancySnapshot, ZoneRegistry,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about = "Zone occupancy from detector output")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a detections feed and publish occupancy snapshots
    Run {
        #[command(flatten)]
        common: CommonArgs,
        /// JSON-lines detections feed, or "-" for stdin.
        #[arg(long, default_value = "-")]
        detections: PathBuf,
        /// Snapshot output path.
        #[arg(long, env = "OCCUPANCY_OUTPUT")]
        output: Option<PathBuf>,
        /// Room identifier included in the snapshot.
        #[arg(long)]
        room_id: Option<String>,
        /// Pace frames by their `t` offsets instead of processing as fast as possible.
        #[arg(long)]
        realtime: bool,
    },

    /// Validate the zones file and print the zones in frame coordinates
    Check {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "OCCUPANCY_CONFIG")]
    config: Option<PathBuf>,
    /// Zone definitions file.
    #[arg(long)]
    zones: Option<PathBuf>,
    /// Live frame width in pixels.
    #[arg(long, requires = "frame_height")]
    frame_width: Option<u32>,
    /// Live frame height in pixels.
    #[arg(long, requires = "frame_width")]
    frame_height: Option<u32>,
}

impl CommonArgs {
    fn load_config(&self) -> Result<OccupancyConfig> {
        let mut cfg = match &self.config {
            Some(path) => OccupancyConfig::load_from(path)?,
            None => OccupancyConfig::load()?,
        };
        if let Some(zones) = &self.zones {
            cfg.zones_path = zones.clone();
        }
        if let (Some(width), Some(height)) = (self.frame_width, self.frame_height) {
            cfg.frame_size = ImageSize::new(width, height);
        }
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            common,
            detections,
            output,
            room_id,
            realtime,
        } => {
            let mut cfg = common.load_config()?;
            if let Some(output) = output {
                cfg.output_path = output;
            }
            if let Some(room_id) = room_id {
                cfg.room_id = Some(room_id);
            }
            cfg.validate()?;
            cmd_run(&cfg, detections, realtime)
        }
        Command::Check { common } => {
            let cfg = common.load_config()?;
            cfg.validate()?;
            cmd_check(&cfg)
        }
    }
}

fn load_zones(cfg: &OccupancyConfig) -> Result<ZoneRegistry> {
    let zones = ZoneRegistry::load(&cfg.zones_path)?;
    if zones.is_empty() {
        return Err(anyhow!(
            "{} contains no usable zones",
            cfg.zones_path.display()
        ));
    }
    Ok(zones)
}

fn cmd_check(cfg: &OccupancyConfig) -> Result<()> {
    let zones = load_zones(cfg)?;
    let pipeline = OccupancyPipeline::from_config(cfg, &zones, Instant::now())?;
    let authored = zones
        .image_size()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unspecified".to_string());
    println!(
        "{}: {} zones, authored at {}, frame {}",
        cfg.zones_path.display(),
        zones.len(),
        authored,
        cfg.frame_size
    );
    for zone in pipeline.zones().zones() {
        let points: Vec<String> = zone
            .points
            .iter()
            .map(|p| format!("({},{})", p.x, p.y))
            .collect();
        println!("  {:<24} {}", zone.id, points.join(" "));
    }
    println!(
        "mask coverage: {:.1}%",
        pipeline.zone_mask().coverage() * 100.0
    );
    Ok(())
}

fn cmd_run(cfg: &OccupancyConfig, detections: PathBuf, realtime: bool) -> Result<()> {
    let zones = load_zones(cfg)?;
    let mut source = JsonLinesSource::open(&detections)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            if shutdown.swap(true, Ordering::SeqCst) {
                std::process::exit(130);
            }
        })
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    }

    let start = Instant::now();
    let wall_start = SystemTime::now();
    let mut pipeline = OccupancyPipeline::from_config(cfg, &zones, start)?;

    log::info!(
        "occupancyd running. reading {} from {}, writing {}",
        source.name(),
        detections.display(),
        cfg.output_path.display()
    );
    log::info!(
        "thresholds: occupied={:.1}s unoccupied={:.1}s, write interval {}ms",
        cfg.occupied_secs,
        cfg.unoccupied_secs,
        cfg.write_interval.as_millis()
    );

    let mut last_snapshot: Option<OccupancySnapshot> = None;
    let mut clock = FrameClock::new(start, wall_start);
    let mut last_health_log = start;

    while !shutdown.load(Ordering::SeqCst) {
        let Some(frame) = source.next_valid_frame()? else {
            log::info!("detections feed ended");
            break;
        };

        let (now, wall) = match clock.stamp(frame.offset) {
            Ok(stamp) => stamp,
            Err(e) => {
                log::warn!("skipping frame at line {}: {}", source.line_no(), e);
                continue;
            }
        };
        if realtime && clock.uses_offsets() {
            let wait = now.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
        }

        let report = pipeline.process_frame(&frame.detections, now, wall);
        for transition in &report.transitions {
            log::debug!(
                "transition zone={} occupied={} at +{:.1}s",
                transition.zone_id,
                transition.occupied,
                transition.at.saturating_duration_since(start).as_secs_f64()
            );
        }
        last_snapshot = Some(report.snapshot);

        if now.saturating_duration_since(last_health_log) >= HEALTH_LOG_INTERVAL {
            log::info!(
                "frames={} occupied={}/{} snapshot_writes={}",
                pipeline.frames_processed(),
                pipeline.engine().occupied_count(),
                pipeline.zones().len(),
                pipeline.publisher().writes()
            );
            last_health_log = now;
        }
    }

    if shutdown.load(Ordering::SeqCst) {
        log::info!("shutdown signal received");
    }
    if let Some(snapshot) = last_snapshot {
        pipeline.publish_now(&snapshot, clock.last())?;
        log::info!("final snapshot written to {}", cfg.output_path.display());
    }
    Ok(())
}
