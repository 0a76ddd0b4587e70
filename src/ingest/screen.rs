//! Screen capture frame source.
//!
//! Grabs the whole primary monitor (or a `Region` of it) on every read and
//! converts the RGBA screenshot into the RGB layout the encoder takes.
//! A `stub://WIDTHxHEIGHT` monitor name selects a synthetic desktop.

use anyhow::{anyhow, Result};
use image::RgbaImage;

use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::frame::{Frame, Region};

const STUB_DESKTOP_WIDTH: u32 = 1280;
const STUB_DESKTOP_HEIGHT: u32 = 720;

/// Configuration for a screen source.
#[derive(Clone, Debug, Default)]
pub struct ScreenConfig {
    /// Area to capture; `None` captures the full screen.
    pub region: Option<Region>,
    /// Monitor to capture. `None` picks the primary monitor.
    pub monitor: Option<String>,
}

pub struct ScreenSource {
    backend: ScreenBackend,
    region: Option<Region>,
}

enum ScreenBackend {
    Synthetic(SyntheticDesktop),
    #[cfg(feature = "screen-xcap")]
    Monitor(Option<String>),
}

impl ScreenSource {
    pub fn open(config: ScreenConfig) -> Result<Self> {
        let backend = match config.monitor.as_deref() {
            Some(name) if name.starts_with("stub://") => {
                ScreenBackend::Synthetic(SyntheticDesktop::parse(name)?)
            }
            other => open_monitor(other)?,
        };
        log::info!(
            "ScreenSource: capturing {}",
            describe_region(config.region.as_ref())
        );
        Ok(Self {
            backend,
            region: config.region,
        })
    }

    pub fn region(&self) -> Option<Region> {
        self.region
    }

    pub fn set_region(&mut self, region: Option<Region>) {
        log::info!(
            "ScreenSource: capture area set to {}",
            describe_region(region.as_ref())
        );
        self.region = region;
    }

    /// Take one screenshot of the configured area.
    pub fn read_frame(&mut self) -> Option<Frame> {
        let screenshot = match &mut self.backend {
            ScreenBackend::Synthetic(desktop) => Ok(desktop.capture()),
            #[cfg(feature = "screen-xcap")]
            ScreenBackend::Monitor(name) => capture_monitor(name.as_deref()),
        };
        let result = screenshot.and_then(|shot| crop_to_frame(&shot, self.region.as_ref()));
        match result {
            Ok(frame) => Some(frame),
            Err(err) => {
                log::debug!("ScreenSource: {:#}", err);
                None
            }
        }
    }
}

#[cfg(feature = "screen-xcap")]
fn open_monitor(name: Option<&str>) -> Result<ScreenBackend> {
    let name = name.map(str::to_string);
    // Look up once so a missing monitor fails at open time.
    select_monitor(name.as_deref())?;
    Ok(ScreenBackend::Monitor(name))
}

/// Monitors are looked up per capture; handles are not kept across threads.
#[cfg(feature = "screen-xcap")]
fn select_monitor(name: Option<&str>) -> Result<xcap::Monitor> {
    let mut monitors =
        xcap::Monitor::all().map_err(|e| anyhow!("failed to enumerate monitors: {}", e))?;
    let index = match name {
        Some(name) => monitors
            .iter()
            .position(|m| m.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| anyhow!("no monitor named '{}'", name))?,
        None => {
            if monitors.is_empty() {
                return Err(anyhow!("no monitor found"));
            }
            monitors
                .iter()
                .position(|m| m.is_primary().unwrap_or(false))
                .unwrap_or(0)
        }
    };
    Ok(monitors.swap_remove(index))
}

#[cfg(feature = "screen-xcap")]
fn capture_monitor(name: Option<&str>) -> Result<RgbaImage> {
    select_monitor(name)?
        .capture_image()
        .map_err(|e| anyhow!("screen capture failed: {}", e))
}

#[cfg(not(feature = "screen-xcap"))]
fn open_monitor(_name: Option<&str>) -> Result<ScreenBackend> {
    Err(anyhow!("screen capture requires the screen-xcap feature"))
}

/// Crop a screenshot to `region` and convert it to an RGB frame.
fn crop_to_frame(screenshot: &RgbaImage, region: Option<&Region>) -> Result<Frame> {
    let (width, height) = screenshot.dimensions();
    let area = match region {
        None => Region::new(0, 0, width, height),
        Some(region) => region.clip_to(width, height).ok_or_else(|| {
            anyhow!(
                "capture area {:?} lies outside the {}x{} screen",
                region,
                width,
                height
            )
        })?,
    };
    let cropped = image::imageops::crop_imm(screenshot, area.x, area.y, area.width, area.height)
        .to_image();
    let rgb = normalize_to_rgb(
        cropped.as_raw(),
        area.width,
        area.height,
        PixelFormat::Rgba32,
    )?;
    Frame::from_rgb(rgb, area.width, area.height)
}

fn describe_region(region: Option<&Region>) -> String {
    match region {
        None => "full screen".to_string(),
        Some(r) => format!("{}x{} at ({}, {})", r.width, r.height, r.x, r.y),
    }
}

/// Fake desktop: a fixed gradient, one pixel column brighter per frame.
struct SyntheticDesktop {
    width: u32,
    height: u32,
    tick: u32,
}

impl SyntheticDesktop {
    fn parse(name: &str) -> Result<Self> {
        let size = name.trim_start_matches("stub://");
        let (width, height) = match size.split_once('x') {
            Some((w, h)) => (
                w.parse()
                    .map_err(|_| anyhow!("invalid stub desktop width in '{}'", name))?,
                h.parse()
                    .map_err(|_| anyhow!("invalid stub desktop height in '{}'", name))?,
            ),
            None => (STUB_DESKTOP_WIDTH, STUB_DESKTOP_HEIGHT),
        };
        if width == 0 || height == 0 {
            return Err(anyhow!("stub desktop must have a non-zero size"));
        }
        Ok(Self {
            width,
            height,
            tick: 0,
        })
    }

    fn capture(&mut self) -> RgbaImage {
        self.tick = self.tick.wrapping_add(1);
        let tick = self.tick;
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            image::Rgba([
                (x % 256) as u8,
                (y % 256) as u8,
                (x.wrapping_add(tick) % 256) as u8,
                255,
            ])
        })
    }
}
