//! Frame capture backends.
//!
//! This module provides the three origins a `FrameSource` can pull from:
//! - Capture devices: local cameras (feature: device-v4l2), network cameras
//!   (feature: device-http) and synthetic `stub://` cameras
//! - Image datasets: numbered still images in a local folder
//! - Screen capture: the primary monitor or a region of it (feature: screen-xcap)
//!
//! Every backend hands out decoded RGB `Frame`s and reports "nothing to give"
//! as `None`; errors are reserved for opening the backend.

pub mod dataset;
pub mod device;
#[cfg(feature = "device-http")]
mod http;
mod normalize;
pub mod screen;
#[cfg(feature = "device-v4l2")]
mod v4l2;

pub use dataset::{DatasetConfig, DatasetSource};
pub use device::{DeviceConfig, DeviceSource};
pub use screen::{ScreenConfig, ScreenSource};
