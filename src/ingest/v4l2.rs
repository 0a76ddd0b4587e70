//! V4L2 capture backend.
//!
//! Streams from a local device node (e.g. `/dev/video0`) through memory-mapped
//! buffers. The device is asked for RGB24 and falls back to NV12 when the driver
//! refuses; anything else is rejected at open time.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::frame::Frame;

const STREAM_BUFFERS: u32 = 4;

pub(crate) struct V4l2Device {
    path: String,
    state: V4l2State,
    width: u32,
    height: u32,
    format: PixelFormat,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Device {
    pub(crate) fn open(path: &str, width: u32, height: u32) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device =
            v4l::Device::with_path(path).with_context(|| format!("open v4l2 device {}", path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = width;
        format.height = height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Device: failed to set format on {}: {}", path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        let pixel_format = match &format.fourcc.repr {
            b"RGB3" => PixelFormat::Rgb24,
            b"BGR3" => PixelFormat::Bgr24,
            b"NV12" => PixelFormat::Nv12,
            other => {
                return Err(anyhow!(
                    "v4l2 device {} negotiated unsupported pixel format {}",
                    path,
                    String::from_utf8_lossy(other)
                ))
            }
        };

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Device: streaming {} ({}x{}, {:?})",
            path,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            path: path.to_string(),
            state,
            width: format.width,
            height: format.height,
            format: pixel_format,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.width, self.height, self.format);
        let rgb = self
            .state
            .with_mut(|fields| {
                let (buf, meta) = fields.stream.next()?;
                let used = (meta.bytesused as usize).min(buf.len());
                let used = if used == 0 { buf.len() } else { used };
                Ok::<_, std::io::Error>(buf[..used].to_vec())
            })
            .with_context(|| format!("capture v4l2 frame from {}", self.path))?;
        let rgb = normalize_to_rgb(&rgb, width, height, format)?;
        Frame::from_rgb(rgb, width, height).map(Some)
    }
}
