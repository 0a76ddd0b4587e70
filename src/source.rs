//! The shared frame source.
//!
//! A `FrameSource` is created once per process and shared (behind an `Arc`) by
//! every stream session and by the control surface. It pairs one capture
//! backend with the `CaptureControls` all sessions obey.
//!
//! Backend reads are serialized; control flags and statistics are not, except
//! for the dataset index. Dataset sources keep a
//! single playback index for everyone, so two viewers of the same dataset each
//! see every other image.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::control::{CaptureControls, DEFAULT_FPS};
use crate::frame::{Frame, Region};
use crate::ingest::{
    DatasetConfig, DatasetSource, DeviceConfig, DeviceSource, ScreenConfig, ScreenSource,
};

/// Which origin a source pulls frames from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Device,
    Dataset,
    Screen,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Device => "device",
            SourceKind::Dataset => "dataset",
            SourceKind::Screen => "screen",
        };
        f.write_str(name)
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "device" | "real" | "camera" => Ok(SourceKind::Device),
            "dataset" | "simulated" | "simu" => Ok(SourceKind::Dataset),
            "screen" => Ok(SourceKind::Screen),
            other => Err(anyhow!(
                "unknown source kind '{}'; expected device, dataset or screen",
                other
            )),
        }
    }
}

/// Origin-specific options.
#[derive(Clone, Debug)]
pub enum SourceOrigin {
    Device(DeviceConfig),
    Dataset(DatasetConfig),
    Screen(ScreenConfig),
}

impl SourceOrigin {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceOrigin::Device(_) => SourceKind::Device,
            SourceOrigin::Dataset(_) => SourceKind::Dataset,
            SourceOrigin::Screen(_) => SourceKind::Screen,
        }
    }
}

/// Everything needed to build a `FrameSource`.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    pub origin: SourceOrigin,
    /// Target frame rate; must be greater than zero.
    pub fps: u32,
    /// Burn the capture time into each frame.
    pub show_timestamp: bool,
}

impl SourceConfig {
    pub fn new(origin: SourceOrigin) -> Self {
        Self {
            origin,
            fps: DEFAULT_FPS,
            show_timestamp: false,
        }
    }

    pub fn device(config: DeviceConfig) -> Self {
        Self::new(SourceOrigin::Device(config))
    }

    pub fn dataset(config: DatasetConfig) -> Self {
        Self::new(SourceOrigin::Dataset(config))
    }

    pub fn screen(config: ScreenConfig) -> Self {
        Self::new(SourceOrigin::Screen(config))
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_timestamp(mut self, show_timestamp: bool) -> Self {
        self.show_timestamp = show_timestamp;
        self
    }
}

/// Counters for a frame source.
#[derive(Clone, Debug, Serialize)]
pub struct SourceStats {
    pub kind: SourceKind,
    pub description: String,
    pub frames_captured: u64,
    pub frames_missed: u64,
    pub capture_enabled: bool,
    pub show_timestamp: bool,
    pub terminated: bool,
    pub fps: u32,
}

enum Backend {
    Device(DeviceSource),
    Dataset(DatasetSource),
    Screen(ScreenSource),
}

pub struct FrameSource {
    kind: SourceKind,
    /// Device id, dataset folder or monitor name, fixed at open.
    label: String,
    controls: CaptureControls,
    backend: Mutex<Backend>,
    /// Copy of the screen capture area, readable while a capture is running.
    region: Mutex<Option<Region>>,
    frames_captured: AtomicU64,
    frames_missed: AtomicU64,
}

/// Open a frame source for sharing between stream sessions.
///
/// Fails when the backend cannot be opened (missing device, missing dataset
/// folder, feature not compiled in). The failure is logged here once.
pub fn create_frame_source(config: SourceConfig) -> Result<Arc<FrameSource>> {
    let kind = config.origin.kind();
    match FrameSource::open(config) {
        Ok(source) => Ok(Arc::new(source)),
        Err(err) => {
            log::error!("cannot open {} source: {:#}", kind, err);
            Err(err)
        }
    }
}

impl FrameSource {
    pub fn open(config: SourceConfig) -> Result<Self> {
        let controls = CaptureControls::new(config.fps)?;
        controls.set_show_timestamp(config.show_timestamp);
        let kind = config.origin.kind();
        let (label, region) = match &config.origin {
            SourceOrigin::Device(device) => (device.device.clone(), None),
            SourceOrigin::Dataset(dataset) => (dataset.folder.display().to_string(), None),
            SourceOrigin::Screen(screen) => (
                screen
                    .monitor
                    .clone()
                    .unwrap_or_else(|| "primary monitor".to_string()),
                screen.region,
            ),
        };
        let backend = match config.origin {
            SourceOrigin::Device(device) => {
                let name = device.device.clone();
                Backend::Device(
                    DeviceSource::open(device)
                        .with_context(|| format!("open capture device '{}'", name))?,
                )
            }
            SourceOrigin::Dataset(dataset) => {
                Backend::Dataset(DatasetSource::open(dataset).context("open image dataset")?)
            }
            SourceOrigin::Screen(screen) => {
                Backend::Screen(ScreenSource::open(screen).context("open screen capture")?)
            }
        };
        Ok(Self {
            kind,
            label,
            controls,
            backend: Mutex::new(backend),
            region: Mutex::new(region),
            frames_captured: AtomicU64::new(0),
            frames_missed: AtomicU64::new(0),
        })
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn controls(&self) -> &CaptureControls {
        &self.controls
    }

    /// Pull one decoded frame, `None` when the origin has nothing to give.
    ///
    /// Not idempotent: a cycling dataset advances its shared index on every
    /// successful call.
    pub fn get_one_frame(&self) -> Option<Frame> {
        let frame = match &mut *self.backend() {
            Backend::Device(source) => source.read_frame(),
            Backend::Dataset(source) => source.read_frame(),
            Backend::Screen(source) => source.read_frame(),
        };
        let counter = if frame.is_some() {
            &self.frames_captured
        } else {
            &self.frames_missed
        };
        counter.fetch_add(1, Ordering::Relaxed);
        frame
    }

    pub fn set_capture_enabled(&self, enabled: bool) {
        self.controls.set_capture_enabled(enabled);
    }

    pub fn set_show_timestamp(&self, enabled: bool) {
        self.controls.set_show_timestamp(enabled);
    }

    pub fn set_frames_per_second(&self, fps: u32) -> Result<()> {
        self.controls.set_fps(fps)
    }

    /// Terminate every stream reading from this source at its next cycle.
    pub fn stop(&self) {
        log::info!("{} source stopped", self.kind);
        self.controls.stop();
    }

    pub fn is_terminated(&self) -> bool {
        self.controls.is_terminated()
    }

    /// Dataset only: 0 disables cycling, N > 0 wraps the index at N.
    pub fn set_test_mode(&self, cycle_length: usize) -> Result<()> {
        match &mut *self.backend() {
            Backend::Dataset(source) => {
                source.set_cycle_length(cycle_length);
                Ok(())
            }
            _ => Err(self.wrong_kind("set_test_mode", SourceKind::Dataset)),
        }
    }

    /// Dataset only: the image index the next read will load.
    pub fn set_next_frame_index(&self, index: usize) -> Result<()> {
        match &mut *self.backend() {
            Backend::Dataset(source) => {
                source.set_next_index(index);
                Ok(())
            }
            _ => Err(self.wrong_kind("set_next_frame_index", SourceKind::Dataset)),
        }
    }

    /// Dataset only: current playback index.
    pub fn current_index(&self) -> Option<usize> {
        match &*self.backend() {
            Backend::Dataset(source) => Some(source.current_index()),
            _ => None,
        }
    }

    /// Screen only: `None` captures the whole screen.
    pub fn set_capture_region(&self, region: Option<Region>) -> Result<()> {
        match &mut *self.backend() {
            Backend::Screen(source) => {
                source.set_region(region);
                *self.region.lock().unwrap_or_else(PoisonError::into_inner) = region;
                Ok(())
            }
            _ => Err(self.wrong_kind("set_capture_region", SourceKind::Screen)),
        }
    }

    pub fn capture_region(&self) -> Option<Region> {
        *self.region.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counters and flags. Only dataset sources wait for a running capture.
    pub fn stats(&self) -> SourceStats {
        SourceStats {
            kind: self.kind,
            description: self.description(),
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_missed: self.frames_missed.load(Ordering::Relaxed),
            capture_enabled: self.controls.capture_enabled(),
            show_timestamp: self.controls.show_timestamp(),
            terminated: self.controls.is_terminated(),
            fps: self.controls.fps(),
        }
    }

    fn description(&self) -> String {
        match self.kind {
            SourceKind::Device => self.label.clone(),
            SourceKind::Screen => match self.capture_region() {
                Some(r) => format!("{} region {}x{}+{}+{}", self.label, r.width, r.height, r.x, r.y),
                None => format!("{} full screen", self.label),
            },
            SourceKind::Dataset => match &*self.backend() {
                Backend::Dataset(source) => format!(
                    "{} (index {}, cycle {})",
                    self.label,
                    source.current_index(),
                    source.cycle_length()
                ),
                _ => self.label.clone(),
            },
        }
    }

    fn backend(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wrong_kind(&self, operation: &str, expected: SourceKind) -> anyhow::Error {
        anyhow!(
            "{} is only supported by {} sources, this is a {} source",
            operation,
            expected,
            self.kind
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_device() -> FrameSource {
        FrameSource::open(SourceConfig::device(DeviceConfig::new("stub://cam"))).unwrap()
    }

    #[test]
    fn parses_kind_aliases() {
        assert_eq!("real".parse::<SourceKind>().unwrap(), SourceKind::Device);
        assert_eq!("Simulated".parse::<SourceKind>().unwrap(), SourceKind::Dataset);
        assert_eq!("screen".parse::<SourceKind>().unwrap(), SourceKind::Screen);
        assert!("webcam2".parse::<SourceKind>().is_err());
    }

    #[test]
    fn zero_fps_is_rejected() {
        let config = SourceConfig::device(DeviceConfig::new("stub://cam")).with_fps(0);
        assert!(FrameSource::open(config).is_err());
    }

    #[test]
    fn variant_operations_reject_other_kinds() {
        let source = stub_device();
        assert!(source.set_test_mode(3).is_err());
        assert!(source.set_next_frame_index(1).is_err());
        assert!(source.set_capture_region(None).is_err());
        assert_eq!(source.current_index(), None);
    }

    #[test]
    fn counts_captured_and_missed_frames() {
        let source = FrameSource::open(SourceConfig::device(DeviceConfig::new(
            "stub://cam?frames=1",
        )))
        .unwrap();
        assert!(source.get_one_frame().is_some());
        assert!(source.get_one_frame().is_none());
        let stats = source.stats();
        assert_eq!(stats.frames_captured, 1);
        assert_eq!(stats.frames_missed, 1);
        assert_eq!(stats.kind, SourceKind::Device);
    }

    #[test]
    fn unopenable_device_is_an_error() {
        let result = create_frame_source(SourceConfig::device(DeviceConfig::new("stub://offline")));
        assert!(result.is_err());
    }

    #[test]
    fn screen_region_is_mutable() {
        let source = FrameSource::open(SourceConfig::screen(ScreenConfig {
            region: None,
            monitor: Some("stub://40x30".to_string()),
        }))
        .unwrap();
        source
            .set_capture_region(Some(Region::new(0, 0, 10, 10)))
            .unwrap();
        assert_eq!(source.capture_region(), Some(Region::new(0, 0, 10, 10)));
        let frame = source.get_one_frame().unwrap();
        assert_eq!(frame.width(), 10);
    }

    #[test]
    fn stats_do_not_wait_for_a_running_capture() {
        let device = stub_device();
        let screen = FrameSource::open(SourceConfig::screen(ScreenConfig {
            region: Some(Region::new(1, 2, 3, 4)),
            monitor: Some("stub://40x30".to_string()),
        }))
        .unwrap();

        let busy = (device.backend(), screen.backend());
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::scope(|scope| {
            let (device, screen) = (&device, &screen);
            scope.spawn(move || {
                let _ = tx.send((device.stats(), screen.stats(), screen.capture_region()));
            });
            let result = rx.recv_timeout(std::time::Duration::from_secs(1));
            drop(busy);
            let (device_stats, screen_stats, region) = result.expect("stats while capturing");
            assert_eq!(device_stats.description, "stub://cam");
            assert_eq!(screen_stats.description, "stub://40x30 region 3x4+1+2");
            assert_eq!(region, Some(Region::new(1, 2, 3, 4)));
        });
    }
}

