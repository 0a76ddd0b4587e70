//! Decoded raster frames.
//!
//! - `Frame`: one RGB raster pulled from a frame source, with its capture instant.
//! - `Region`: a rectangle on screen (or inside a frame) in pixel coordinates.

use anyhow::{anyhow, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// One decoded frame. Pixels are always 8-bit RGB.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
        }
    }

    /// Build a frame from a packed RGB24 buffer.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let len = pixels.len();
        let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
            anyhow!(
                "RGB buffer of {} bytes does not fit a {}x{} frame",
                len,
                width,
                height
            )
        })?;
        Ok(Self::new(image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

/// Capture rectangle: `(x, y)` is the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clip this region to a `bounds_width` x `bounds_height` surface.
    ///
    /// Returns `None` when nothing of the region is left on the surface.
    pub fn clip_to(&self, bounds_width: u32, bounds_height: u32) -> Option<Region> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        if self.x >= bounds_width || self.y >= bounds_height {
            return None;
        }
        let width = self.width.min(bounds_width - self.x);
        let height = self.height.min(bounds_height - self.y);
        Some(Region::new(self.x, self.y, width, height))
    }
}
