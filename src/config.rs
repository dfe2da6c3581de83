use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::detect::{
    ClassFilter, DEFAULT_ALLOWED_CLASSES, DEFAULT_MIN_CONFIDENCE, DEFAULT_PERSON_CLASS,
};
use crate::geometry::ImageSize;
use crate::occupancy::{Thresholds, DEFAULT_OCCUPIED_SECS, DEFAULT_UNOCCUPIED_SECS};

const DEFAULT_ZONES_PATH: &str = "zones.json";
const DEFAULT_OUTPUT_PATH: &str = "occupancy.json";
const DEFAULT_FRAME_WIDTH: u32 = 1280;
const DEFAULT_FRAME_HEIGHT: u32 = 720;
const DEFAULT_WRITE_INTERVAL_MS: u64 = 500;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OccupancyConfigFile {
    zones_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    room_id: Option<String>,
    frame: Option<FrameConfigFile>,
    occupancy: Option<ThresholdConfigFile>,
    publish: Option<PublishConfigFile>,
    classes: Option<ClassConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FrameConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ThresholdConfigFile {
    occupied_secs: Option<f64>,
    unoccupied_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PublishConfigFile {
    interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ClassConfigFile {
    allowed: Option<Vec<String>>,
    person: Option<String>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct OccupancyConfig {
    pub zones_path: PathBuf,
    pub output_path: PathBuf,
    pub room_id: Option<String>,
    pub frame_size: ImageSize,
    pub occupied_secs: f64,
    pub unoccupied_secs: f64,
    pub write_interval: Duration,
    pub classes: ClassSettings,
}

#[derive(Debug, Clone)]
pub struct ClassSettings {
    pub allowed: Vec<String>,
    pub person: String,
    pub min_confidence: f32,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self::from_file(OccupancyConfigFile::default())
    }
}

impl OccupancyConfig {
    /// Defaults, then the file named by `OCCUPANCY_CONFIG` (if set), then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("OCCUPANCY_CONFIG").ok();
        let path = config_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Path::new);
        Self::load_layers(path)
    }

    /// Like `load`, but with an explicit config file instead of `OCCUPANCY_CONFIG`.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_layers(Some(path))
    }

    fn load_layers(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => OccupancyConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: OccupancyConfigFile) -> Self {
        let frame = file.frame.unwrap_or_default();
        let thresholds = file.occupancy.unwrap_or_default();
        let classes = file.classes.unwrap_or_default();
        Self {
            zones_path: file
                .zones_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ZONES_PATH)),
            output_path: file
                .output_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
            room_id: file.room_id.filter(|id| !id.trim().is_empty()),
            frame_size: ImageSize::new(
                frame.width.unwrap_or(DEFAULT_FRAME_WIDTH),
                frame.height.unwrap_or(DEFAULT_FRAME_HEIGHT),
            ),
            occupied_secs: thresholds.occupied_secs.unwrap_or(DEFAULT_OCCUPIED_SECS),
            unoccupied_secs: thresholds
                .unoccupied_secs
                .unwrap_or(DEFAULT_UNOCCUPIED_SECS),
            write_interval: Duration::from_millis(
                file.publish
                    .and_then(|publish| publish.interval_ms)
                    .unwrap_or(DEFAULT_WRITE_INTERVAL_MS),
            ),
            classes: ClassSettings {
                allowed: classes.allowed.unwrap_or_else(|| {
                    DEFAULT_ALLOWED_CLASSES
                        .iter()
                        .map(|name| name.to_string())
                        .collect()
                }),
                person: classes
                    .person
                    .unwrap_or_else(|| DEFAULT_PERSON_CLASS.to_string()),
                min_confidence: classes.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("OCCUPANCY_ZONES") {
            if !path.trim().is_empty() {
                self.zones_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("OCCUPANCY_OUTPUT") {
            if !path.trim().is_empty() {
                self.output_path = PathBuf::from(path);
            }
        }
        if let Ok(room_id) = std::env::var("OCCUPANCY_ROOM_ID") {
            if !room_id.trim().is_empty() {
                self.room_id = Some(room_id.trim().to_string());
            }
        }
        if let Ok(secs) = std::env::var("OCCUPANCY_OCCUPIED_SECS") {
            self.occupied_secs = secs.trim().parse().map_err(|_| {
                anyhow!("OCCUPANCY_OCCUPIED_SECS must be a number of seconds")
            })?;
        }
        if let Ok(secs) = std::env::var("OCCUPANCY_UNOCCUPIED_SECS") {
            self.unoccupied_secs = secs.trim().parse().map_err(|_| {
                anyhow!("OCCUPANCY_UNOCCUPIED_SECS must be a number of seconds")
            })?;
        }
        if let Ok(ms) = std::env::var("OCCUPANCY_WRITE_INTERVAL_MS") {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                anyhow!("OCCUPANCY_WRITE_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.write_interval = Duration::from_millis(ms);
        }
        if let Ok(classes) = std::env::var("OCCUPANCY_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.classes.allowed = parsed;
            }
        }
        if let Ok(conf) = std::env::var("OCCUPANCY_MIN_CONFIDENCE") {
            self.classes.min_confidence = conf.trim().parse().map_err(|_| {
                anyhow!("OCCUPANCY_MIN_CONFIDENCE must be a number between 0 and 1")
            })?;
        }
        Ok(())
    }

    /// Check cross-field constraints. Called by the loaders and again after CLI overrides.
    pub fn validate(&self) -> Result<()> {
        self.thresholds()?;
        self.class_filter()?;
        if self.write_interval.is_zero() {
            return Err(anyhow!("publish interval must be greater than zero"));
        }
        if self.frame_size.width == 0 || self.frame_size.height == 0 {
            return Err(anyhow!(
                "frame size must be non-zero (got {})",
                self.frame_size
            ));
        }
        if let Some(room_id) = &self.room_id {
            validate_room_id(room_id)?;
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Result<Thresholds> {
        Thresholds::from_secs(self.occupied_secs, self.unoccupied_secs)
    }

    pub fn class_filter(&self) -> Result<ClassFilter> {
        ClassFilter::new(
            self.classes.allowed.iter().cloned(),
            &self.classes.person,
            self.classes.min_confidence,
        )
    }
}

/// Room ids label the published snapshot and must be printable and short.
///
/// Allowed: "lib_1", "floor:2", "reading-room.east"
/// Disallowed: empty strings, whitespace, slashes, quotes.
pub fn validate_room_id(room_id: &str) -> Result<()> {
    static ROOM_ID_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = ROOM_ID_RE.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_:.\-]{0,63}$").expect("room id regex")
    });
    if !re.is_match(room_id) {
        return Err(anyhow!(
            "room_id {:?} must match ^[A-Za-z0-9][A-Za-z0-9_:.-]{{0,63}}$",
            room_id
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<OccupancyConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = OccupancyConfig::default();
        assert_eq!(cfg.zones_path, PathBuf::from("zones.json"));
        assert_eq!(cfg.output_path, PathBuf::from("occupancy.json"));
        assert_eq!(cfg.room_id, None);
        assert_eq!(cfg.frame_size, ImageSize::new(1280, 720));
        assert_eq!(cfg.thresholds().unwrap(), Thresholds::default());
        assert_eq!(cfg.write_interval, Duration::from_millis(500));
        assert_eq!(cfg.class_filter().unwrap(), ClassFilter::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = OccupancyConfig::default();
        cfg.unoccupied_secs = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = OccupancyConfig::default();
        cfg.write_interval = Duration::ZERO;
        assert!(cfg.validate().is_err());

        let mut cfg = OccupancyConfig::default();
        cfg.classes.allowed.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = OccupancyConfig::default();
        cfg.frame_size = ImageSize::new(0, 720);
        assert!(cfg.validate().is_err());

        let mut cfg = OccupancyConfig::default();
        cfg.room_id = Some("lib 1".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn room_id_validation() {
        assert!(validate_room_id("lib_1").is_ok());
        assert!(validate_room_id("floor:2").is_ok());
        assert!(validate_room_id("reading-room.east").is_ok());
        assert!(validate_room_id("").is_err());
        assert!(validate_room_id("a/b").is_err());
        assert!(validate_room_id(" lead").is_err());
        assert!(validate_room_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn split_csv_trims_entries() {
        assert_eq!(
            split_csv(" person, cup ,,cell phone"),
            vec!["person", "cup", "cell phone"]
        );
    }
}
