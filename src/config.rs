use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::control::{validate_fps, DEFAULT_FPS};
use crate::encode::DEFAULT_JPEG_QUALITY;
use crate::frame::Region;
use crate::ingest::{DatasetConfig, DeviceConfig, ScreenConfig};
use crate::source::{SourceConfig, SourceKind, SourceOrigin};

const DEFAULT_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_MODE: SourceKind = SourceKind::Dataset;
const DEFAULT_DEVICE: &str = "0";
const DEFAULT_DEVICE_WIDTH: u32 = 640;
const DEFAULT_DEVICE_HEIGHT: u32 = 480;
const DEFAULT_DATASET_DIR: &str = "images";
const DEFAULT_DATASET_PREFIX: &str = "test-";
const DEFAULT_DATASET_EXTENSION: &str = "jpeg";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct VcamConfigFile {
    server: Option<ServerConfigFile>,
    camera: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ServerConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    mode: Option<String>,
    fps: Option<u32>,
    show_timestamp: Option<bool>,
    jpeg_quality: Option<u8>,
    device: Option<DeviceConfigFile>,
    dataset: Option<DatasetConfigFile>,
    screen: Option<ScreenConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DeviceConfigFile {
    id: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DatasetConfigFile {
    folder: Option<PathBuf>,
    prefix: Option<String>,
    extension: Option<String>,
    cycle_length: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ScreenConfigFile {
    monitor: Option<String>,
    region: Option<Region>,
}

/// Settings for the `vcamd` daemon.
#[derive(Debug, Clone)]
pub struct VcamConfig {
    pub addr: String,
    pub mode: SourceKind,
    pub fps: u32,
    pub show_timestamp: bool,
    pub jpeg_quality: u8,
    pub device: DeviceConfig,
    pub dataset: DatasetConfig,
    pub screen: ScreenConfig,
}

impl Default for VcamConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            mode: DEFAULT_MODE,
            fps: DEFAULT_FPS,
            show_timestamp: false,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            device: DeviceConfig {
                device: DEFAULT_DEVICE.to_string(),
                width: DEFAULT_DEVICE_WIDTH,
                height: DEFAULT_DEVICE_HEIGHT,
            },
            dataset: DatasetConfig {
                folder: PathBuf::from(DEFAULT_DATASET_DIR),
                prefix: DEFAULT_DATASET_PREFIX.to_string(),
                extension: DEFAULT_DATASET_EXTENSION.to_string(),
                cycle_length: 0,
            },
            screen: ScreenConfig::default(),
        }
    }
}

impl VcamConfig {
    /// Load from the file named by `VCAM_CONFIG` (if set), then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VCAM_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (or defaults when `None`), then apply
    /// environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => VcamConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VcamConfigFile) -> Result<Self> {
        let addr = file
            .server
            .and_then(|server| server.addr)
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let camera = file.camera.unwrap_or_default();
        let mode = match camera.mode.as_deref() {
            Some(mode) => mode.parse()?,
            None => DEFAULT_MODE,
        };
        let device_file = camera.device.unwrap_or_default();
        let device = DeviceConfig {
            device: device_file
                .id
                .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            width: device_file.width.unwrap_or(DEFAULT_DEVICE_WIDTH),
            height: device_file.height.unwrap_or(DEFAULT_DEVICE_HEIGHT),
        };
        let dataset_file = camera.dataset.unwrap_or_default();
        let dataset = DatasetConfig {
            folder: dataset_file
                .folder
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATASET_DIR)),
            prefix: dataset_file
                .prefix
                .unwrap_or_else(|| DEFAULT_DATASET_PREFIX.to_string()),
            extension: dataset_file
                .extension
                .unwrap_or_else(|| DEFAULT_DATASET_EXTENSION.to_string()),
            cycle_length: dataset_file.cycle_length.unwrap_or(0),
        };
        let screen_file = camera.screen.unwrap_or_default();
        let screen = ScreenConfig {
            region: screen_file.region,
            monitor: screen_file.monitor,
        };
        Ok(Self {
            addr,
            mode,
            fps: camera.fps.unwrap_or(DEFAULT_FPS),
            show_timestamp: camera.show_timestamp.unwrap_or(false),
            jpeg_quality: camera.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            device,
            dataset,
            screen,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_value("VCAM_ADDR") {
            self.addr = addr;
        }
        if let Some(mode) = env_value("VCAM_MODE") {
            self.mode = mode.parse()?;
        }
        if let Some(device) = env_value("VCAM_DEVICE") {
            self.device.device = device;
        }
        if let Some(dir) = env_value("VCAM_DATASET_DIR") {
            self.dataset.folder = PathBuf::from(dir);
        }
        if let Some(prefix) = env_value("VCAM_DATASET_PREFIX") {
            self.dataset.prefix = prefix;
        }
        if let Some(fps) = env_value("VCAM_FPS") {
            self.fps = fps
                .parse()
                .map_err(|_| anyhow!("VCAM_FPS must be a positive integer"))?;
        }
        if let Some(cycle) = env_value("VCAM_CYCLE") {
            self.dataset.cycle_length = cycle
                .parse()
                .map_err(|_| anyhow!("VCAM_CYCLE must be a non-negative integer"))?;
        }
        if let Some(flag) = env_value("VCAM_TIMESTAMP") {
            self.show_timestamp = parse_flag(&flag)
                .ok_or_else(|| anyhow!("VCAM_TIMESTAMP must be true or false"))?;
        }
        if let Some(quality) = env_value("VCAM_JPEG_QUALITY") {
            self.jpeg_quality = quality
                .parse()
                .map_err(|_| anyhow!("VCAM_JPEG_QUALITY must be an integer between 1 and 100"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_fps(self.fps)?;
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!("jpeg quality must be between 1 and 100"));
        }
        if self.addr.trim().is_empty() {
            return Err(anyhow!("server address must not be empty"));
        }
        match self.mode {
            SourceKind::Device if self.device.device.trim().is_empty() => {
                Err(anyhow!("device mode needs a device id"))
            }
            SourceKind::Dataset if self.dataset.folder.as_os_str().is_empty() => {
                Err(anyhow!("dataset mode needs an image folder"))
            }
            SourceKind::Dataset if self.dataset.extension.trim().is_empty() => {
                Err(anyhow!("dataset mode needs an image extension"))
            }
            _ => Ok(()),
        }
    }

    /// Source settings for the configured mode.
    pub fn source_config(&self) -> SourceConfig {
        let origin = match self.mode {
            SourceKind::Device => SourceOrigin::Device(self.device.clone()),
            SourceKind::Dataset => SourceOrigin::Dataset(self.dataset.clone()),
            SourceKind::Screen => SourceOrigin::Screen(self.screen.clone()),
        };
        SourceConfig::new(origin)
            .with_fps(self.fps)
            .with_timestamp(self.show_timestamp)
    }
}

fn read_config_file(path: &Path) -> Result<VcamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parse an on/off flag as written in env vars and query strings.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
