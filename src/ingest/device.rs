//! Capture device frame source.
//!
//! `DeviceSource` binds to one video device when it is opened and hands out one
//! decoded frame per `read_frame` call. Supported device identifiers:
//! - `stub://<name>`: synthetic in-process camera (tests, demos)
//! - `N` (bare integer): local camera index, mapped to `/dev/videoN` (feature: device-v4l2)
//! - `/dev/...` or any other local path: V4L2 device node (feature: device-v4l2)
//! - `http(s)://...`: network camera serving MJPEG or single JPEG snapshots (feature: device-http)
//!
//! Opening fails if the device cannot be reached. Once open, read failures
//! (device glitch, disconnect, end of stream) are reported as `None`.

use anyhow::{anyhow, Result};

#[cfg(feature = "device-http")]
use super::http::HttpDevice;
use super::normalize::{normalize_to_rgb, PixelFormat};
#[cfg(feature = "device-v4l2")]
use super::v4l2::V4l2Device;
use crate::frame::Frame;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

/// Configuration for a capture device.
#[derive(Clone, Debug)]
pub struct DeviceConfig {
    /// Device identifier: index, device path, camera URL or `stub://` name.
    pub device: String,
    /// Preferred frame width. Devices may negotiate a different size.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device: "0".to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl DeviceConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum DeviceLocator {
    Stub { name: String, frame_limit: Option<u64> },
    Node(String),
    Url(String),
}

fn parse_device(device: &str) -> Result<DeviceLocator> {
    let device = device.trim();
    if device.is_empty() {
        return Err(anyhow!("device identifier is empty"));
    }
    if let Some(rest) = device.strip_prefix("stub://") {
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut frame_limit = None;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some(("frames", value)) => {
                    frame_limit = Some(
                        value
                            .parse()
                            .map_err(|_| anyhow!("stub frames must be an integer: {}", value))?,
                    );
                }
                _ => return Err(anyhow!("unsupported stub device option '{}'", pair)),
            }
        }
        return Ok(DeviceLocator::Stub {
            name: name.to_string(),
            frame_limit,
        });
    }
    if device.starts_with("http://") || device.starts_with("https://") {
        return Ok(DeviceLocator::Url(device.to_string()));
    }
    if device.contains("://") {
        return Err(anyhow!(
            "unsupported device scheme in '{}'; expected http(s):// or stub://",
            device
        ));
    }
    if let Ok(index) = device.parse::<u32>() {
        return Ok(DeviceLocator::Node(format!("/dev/video{}", index)));
    }
    Ok(DeviceLocator::Node(device.to_string()))
}

/// An opened capture device.
pub struct DeviceSource {
    backend: DeviceBackend,
    device: String,
}

enum DeviceBackend {
    Synthetic(SyntheticDevice),
    #[cfg(feature = "device-v4l2")]
    V4l2(V4l2Device),
    #[cfg(feature = "device-http")]
    Http(HttpDevice),
}

impl DeviceSource {
    /// Open the device named by `config.device`.
    pub fn open(config: DeviceConfig) -> Result<Self> {
        let backend = match parse_device(&config.device)? {
            DeviceLocator::Stub { name, frame_limit } => {
                DeviceBackend::Synthetic(SyntheticDevice::open(name, frame_limit, &config)?)
            }
            DeviceLocator::Node(path) => open_node(path, &config)?,
            DeviceLocator::Url(url) => open_url(url, &config)?,
        };
        log::info!("DeviceSource: opened {}", config.device);
        Ok(Self {
            backend,
            device: config.device,
        })
    }

    /// Read the next frame, `None` when the device has nothing to give.
    pub fn read_frame(&mut self) -> Option<Frame> {
        let result = match &mut self.backend {
            DeviceBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "device-v4l2")]
            DeviceBackend::V4l2(source) => source.next_frame(),
            #[cfg(feature = "device-http")]
            DeviceBackend::Http(source) => source.next_frame(),
        };
        match result {
            Ok(frame) => frame,
            Err(err) => {
                log::debug!("DeviceSource: read from {} failed: {:#}", self.device, err);
                None
            }
        }
    }
}

#[cfg(feature = "device-v4l2")]
fn open_node(path: String, config: &DeviceConfig) -> Result<DeviceBackend> {
    Ok(DeviceBackend::V4l2(V4l2Device::open(
        &path,
        config.width,
        config.height,
    )?))
}

#[cfg(not(feature = "device-v4l2"))]
fn open_node(path: String, _config: &DeviceConfig) -> Result<DeviceBackend> {
    Err(anyhow!(
        "cannot open {}: local capture devices require the device-v4l2 feature",
        path
    ))
}

#[cfg(feature = "device-http")]
fn open_url(url: String, _config: &DeviceConfig) -> Result<DeviceBackend> {
    Ok(DeviceBackend::Http(HttpDevice::open(&url)?))
}

#[cfg(not(feature = "device-http"))]
fn open_url(url: String, _config: &DeviceConfig) -> Result<DeviceBackend> {
    Err(anyhow!(
        "cannot open {}: network cameras require the device-http feature",
        url
    ))
}

// ----------------------------------------------------------------------------
// Synthetic device (stub://)
// ----------------------------------------------------------------------------

/// Moving BGR test pattern, the layout most webcams hand out.
struct SyntheticDevice {
    width: u32,
    height: u32,
    frame_count: u64,
    frame_limit: Option<u64>,
}

impl SyntheticDevice {
    fn open(name: String, frame_limit: Option<u64>, config: &DeviceConfig) -> Result<Self> {
        if name == "offline" {
            return Err(anyhow!("synthetic device stub://offline cannot be opened"));
        }
        Ok(Self {
            width: config.width.max(1),
            height: config.height.max(1),
            frame_count: 0,
            frame_limit,
        })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(limit) = self.frame_limit {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        self.frame_count += 1;

        let w = self.width as usize;
        let h = self.height as usize;
        let shift = (self.frame_count * 4) as usize;
        let mut bgr = vec![0u8; w * h * 3];
        for (i, px) in bgr.chunks_exact_mut(3).enumerate() {
            let x = i % w;
            let y = i / w;
            px[0] = ((x + shift) % 256) as u8;
            px[1] = ((y + shift / 2) % 256) as u8;
            px[2] = ((x + y) % 256) as u8;
        }
        let rgb = normalize_to_rgb(&bgr, self.width, self.height, PixelFormat::Bgr24)?;
        Frame::from_rgb(rgb, self.width, self.height).map(Some)
    }
}
