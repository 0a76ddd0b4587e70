//! Frame encoders.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::frame::Frame;

/// Quality used when none is configured (OpenCV's `imencode` default).
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Turns a raster frame into the bytes carried by one stream part.
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>>;

    /// MIME type written in each part header.
    fn content_type(&self) -> &'static str {
        "image/jpeg"
    }
}

/// Baseline JPEG encoder.
#[derive(Clone, Copy, Debug)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl JpegFrameEncoder {
    /// `quality` must be in `1..=100`.
    pub fn new(quality: u8) -> Result<Self> {
        if !(1..=100).contains(&quality) {
            return Err(anyhow!("jpeg quality must be between 1 and 100"));
        }
        Ok(Self { quality })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let image = frame.image();
        let mut buffer = Vec::with_capacity(image.as_raw().len() / 8);
        JpegEncoder::new_with_quality(&mut buffer, self.quality)
            .encode(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgb8,
            )
            .context("encode jpeg")?;
        Ok(buffer)
    }
}
