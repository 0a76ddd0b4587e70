//! Image dataset frame source.
//!
//! Plays back a folder of numbered still images (`<prefix><index>.<extension>`)
//! as if they came from a camera. With cycling enabled, every successful read
//! advances the index and wraps it at `cycle_length`; with cycling disabled the
//! same image is served until the index is moved explicitly.
//!
//! The index belongs to the source, not to a viewer: every stream reading from
//! the same source advances the same counter.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

use crate::frame::Frame;

/// Configuration for an image dataset source.
#[derive(Clone, Debug)]
pub struct DatasetConfig {
    /// Folder holding the images.
    pub folder: PathBuf,
    /// File name prefix, e.g. `test-` for `test-0.jpeg`.
    pub prefix: String,
    /// File extension without the dot.
    pub extension: String,
    /// 0 disables cycling; N > 0 wraps the index at N.
    pub cycle_length: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("."),
            prefix: "test-".to_string(),
            extension: "jpeg".to_string(),
            cycle_length: 0,
        }
    }
}

pub struct DatasetSource {
    config: DatasetConfig,
    current_index: usize,
}

impl DatasetSource {
    pub fn open(config: DatasetConfig) -> Result<Self> {
        if !config.folder.is_dir() {
            return Err(anyhow!(
                "image folder {} does not exist",
                config.folder.display()
            ));
        }
        if config.extension.trim().is_empty() {
            return Err(anyhow!("image extension must not be empty"));
        }
        log::info!(
            "DatasetSource: serving {}/{}N.{} (cycle length {})",
            config.folder.display(),
            config.prefix,
            config.extension,
            config.cycle_length
        );
        Ok(Self {
            config,
            current_index: 0,
        })
    }

    /// Path of the image at `index`.
    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.config.folder.join(format!(
            "{}{}.{}",
            self.config.prefix, index, self.config.extension
        ))
    }

    /// Load the image at the current index, advancing the index when cycling.
    ///
    /// A missing or undecodable file yields `None` and leaves the index alone.
    pub fn read_frame(&mut self) -> Option<Frame> {
        let path = self.frame_path(self.current_index);
        let frame = load_frame(&path)?;
        if self.config.cycle_length > 0 {
            self.current_index = (self.current_index + 1) % self.config.cycle_length;
        }
        Some(frame)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn cycle_length(&self) -> usize {
        self.config.cycle_length
    }

    /// Enable (N > 0) or disable (0) cycling. The index is pulled back into range.
    pub fn set_cycle_length(&mut self, cycle_length: usize) {
        self.config.cycle_length = cycle_length;
        self.current_index = self.wrap(self.current_index);
    }

    /// Jump to `index` for the next read, wrapped when cycling is enabled.
    pub fn set_next_index(&mut self, index: usize) {
        self.current_index = self.wrap(index);
    }

    fn wrap(&self, index: usize) -> usize {
        match self.config.cycle_length {
            0 => index,
            n => index % n,
        }
    }
}

fn load_frame(path: &Path) -> Option<Frame> {
    if !path.is_file() {
        log::debug!("DatasetSource: {} not found", path.display());
        return None;
    }
    match image::open(path) {
        Ok(image) => Some(Frame::new(image.into_rgb8())),
        Err(err) => {
            log::debug!("DatasetSource: cannot decode {}: {}", path.display(), err);
            None
        }
    }
}
