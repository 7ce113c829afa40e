use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{DetectorKind, DetectorParams};

pub const DEFAULT_FEED_URL: &str = "https://webcams.nyctmc.org/api/cameras/";
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://trafficimagetest.s3.us-east-2.amazonaws.com/images";
const DEFAULT_DATA_DIR: &str = ".";
const DEFAULT_CASCADE_PATH: &str = "cars.xml";
const DEFAULT_MAP_PATH: &str = "trafficMap.html";
const DEFAULT_DETECTOR: &str = "haar";

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    data_dir: Option<PathBuf>,
    cascade_path: Option<PathBuf>,
    feed_url: Option<String>,
    map: Option<MapConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct MapConfigFile {
    path: Option<PathBuf>,
    image_base_url: Option<String>,
    embed_images: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    scale_factor: Option<f64>,
    min_neighbors: Option<u32>,
    min_size: Option<[u32; 2]>,
    max_size: Option<[u32; 2]>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root for `out.db`, `CapturedImages/` and `BoundedImages/`.
    pub data_dir: PathBuf,
    pub cascade_path: PathBuf,
    pub feed_url: String,
    pub map: MapSettings,
    pub detector_kind: DetectorKind,
    pub detector: DetectorParams,
}

#[derive(Debug, Clone)]
pub struct MapSettings {
    pub path: PathBuf,
    pub image_base_url: String,
    /// Inline thumbnails into the map instead of linking `image_base_url`.
    pub embed_images: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            cascade_path: PathBuf::from(DEFAULT_CASCADE_PATH),
            feed_url: DEFAULT_FEED_URL.to_string(),
            map: MapSettings {
                path: PathBuf::from(DEFAULT_MAP_PATH),
                image_base_url: DEFAULT_IMAGE_BASE_URL.to_string(),
                embed_images: false,
            },
            detector_kind: DetectorKind::Haar,
            detector: DetectorParams::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRAFFIC_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let map = file.map.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let detector_kind = detector
            .backend
            .as_deref()
            .unwrap_or(DEFAULT_DETECTOR)
            .parse()?;
        Ok(Self {
            data_dir: file.data_dir.unwrap_or(defaults.data_dir),
            cascade_path: file.cascade_path.unwrap_or(defaults.cascade_path),
            feed_url: file.feed_url.unwrap_or(defaults.feed_url),
            map: MapSettings {
                path: map.path.unwrap_or(defaults.map.path),
                image_base_url: map
                    .image_base_url
                    .unwrap_or(defaults.map.image_base_url),
                embed_images: map.embed_images.unwrap_or(defaults.map.embed_images),
            },
            detector_kind,
            detector: DetectorParams {
                scale_factor: detector
                    .scale_factor
                    .unwrap_or(defaults.detector.scale_factor),
                min_neighbors: detector
                    .min_neighbors
                    .unwrap_or(defaults.detector.min_neighbors),
                min_size: detector
                    .min_size
                    .map(|[w, h]| (w, h))
                    .unwrap_or(defaults.detector.min_size),
                max_size: detector.max_size.map(|[w, h]| (w, h)),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("TRAFFIC_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(path) = std::env::var("TRAFFIC_CASCADE") {
            if !path.trim().is_empty() {
                self.cascade_path = PathBuf::from(path);
            }
        }
        if let Ok(url) = std::env::var("TRAFFIC_FEED_URL") {
            if !url.trim().is_empty() {
                self.feed_url = url;
            }
        }
        if let Ok(url) = std::env::var("TRAFFIC_IMAGE_BASE_URL") {
            if !url.trim().is_empty() {
                self.map.image_base_url = url;
            }
        }
        if let Ok(path) = std::env::var("TRAFFIC_MAP_PATH") {
            if !path.trim().is_empty() {
                self.map.path = PathBuf::from(path);
            }
        }
        if let Ok(embed) = std::env::var("TRAFFIC_EMBED_IMAGES") {
            self.map.embed_images = parse_flag(&embed)
                .ok_or_else(|| anyhow!("TRAFFIC_EMBED_IMAGES must be true/false, 1/0 or yes/no"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.detector.validate()?;
        if self.feed_url.trim().is_empty() {
            return Err(anyhow!("feed_url cannot be empty"));
        }
        let base = self.map.image_base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(anyhow!("image_base_url cannot be empty"));
        }
        self.map.image_base_url = base.to_string();
        Ok(())
    }

    /// `path` as-is when absolute, otherwise under `data_dir`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn cascade_file(&self) -> PathBuf {
        self.resolve(&self.cascade_path)
    }

    pub fn map_file(&self) -> PathBuf {
        self.resolve(&self.map.path)
    }

    pub fn record_db(&self) -> PathBuf {
        self.data_dir.join(crate::storage::RECORD_DB_FILE)
    }

    pub fn captured_dir(&self) -> PathBuf {
        self.data_dir.join(crate::ingest::CAPTURED_IMAGES_DIR)
    }

    pub fn bounded_dir(&self) -> PathBuf {
        self.data_dir.join(crate::artifact::BOUNDED_IMAGES_DIR)
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
