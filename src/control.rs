//! Shared capture control flags.
//!
//! One `CaptureControls` lives inside each `FrameSource` and is read by every
//! stream session on every pacing cycle. Writers (the control surface) and
//! readers (pacing loops) never block each other; a flag change becomes
//! visible to a session on its next cycle at the latest.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Default stream frame rate.
pub const DEFAULT_FPS: u32 = 10;

#[derive(Debug)]
pub struct CaptureControls {
    fps: AtomicU32,
    capture_enabled: AtomicBool,
    terminated: AtomicBool,
    show_timestamp: AtomicBool,
}

impl CaptureControls {
    pub fn new(fps: u32) -> Result<Self> {
        validate_fps(fps)?;
        Ok(Self {
            fps: AtomicU32::new(fps),
            capture_enabled: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
            show_timestamp: AtomicBool::new(false),
        })
    }

    pub fn fps(&self) -> u32 {
        self.fps.load(Ordering::Relaxed)
    }

    /// Change the target frame rate. Zero is rejected and leaves the rate unchanged.
    pub fn set_fps(&self, fps: u32) -> Result<()> {
        validate_fps(fps)?;
        self.fps.store(fps, Ordering::Relaxed);
        Ok(())
    }

    /// Delay between two pacing cycles (`1 / fps`).
    pub fn frame_interval(&self) -> Duration {
        frame_interval(self.fps())
    }

    pub fn capture_enabled(&self) -> bool {
        self.capture_enabled.load(Ordering::Relaxed)
    }

    pub fn set_capture_enabled(&self, enabled: bool) {
        self.capture_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn show_timestamp(&self) -> bool {
        self.show_timestamp.load(Ordering::Relaxed)
    }

    pub fn set_show_timestamp(&self, enabled: bool) {
        self.show_timestamp.store(enabled, Ordering::Relaxed);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Mark the source terminated. There is no way back.
    pub fn stop(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}

pub(crate) fn validate_fps(fps: u32) -> Result<()> {
    if fps == 0 {
        return Err(anyhow!("frames per second must be greater than zero"));
    }
    Ok(())
}

pub(crate) fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}
