//! Virtual camera
//!
//! Serves frames from a capture device, a folder of numbered still images, or
//! the screen as an endless MJPEG stream, the way a network camera would.
//!
//! # Module Structure
//!
//! - `ingest`: capture backends (devices, image datasets, screen capture)
//! - `source`: the shared `FrameSource` with its lifecycle and variant controls
//! - `control`: atomically shared pause / timestamp / stop flags and pacing
//! - `overlay`: wall-clock timestamp burned into frames
//! - `encode`: JPEG encoding behind the `FrameEncoder` trait
//! - `stream`: multipart framing and paced stream sessions
//! - `server`: HTTP front end (`/video_feed`, `/snapshot`, `/control/*`)
//! - `config`: daemon configuration from TOML and `VCAM_*` environment variables

pub mod config;
pub mod control;
pub mod encode;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod server;
pub mod source;
pub mod stream;

pub use config::VcamConfig;
pub use control::CaptureControls;
pub use encode::{FrameEncoder, JpegFrameEncoder};
pub use frame::{Frame, Region};
pub use ingest::{DatasetConfig, DeviceConfig, ScreenConfig};
pub use server::{ServerConfig, ServerHandle, StreamServer};
pub use source::{
    create_frame_source, FrameSource, SourceConfig, SourceKind, SourceOrigin, SourceStats,
};
pub use stream::{fetch_one_frame, open_stream, Cycle, MjpegStream};
