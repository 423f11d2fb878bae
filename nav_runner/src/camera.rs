use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use image::RgbImage;
use smart_nav::{FrameSource, NavError, NavResult};

/// Replays the PNG/JPEG files of a directory in name order, looping at the end.
pub struct DirectoryCamera {
    frames: Vec<PathBuf>,
    next: usize,
}

impl DirectoryCamera {
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let mut frames: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("reading frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
            })
            .collect();
        if frames.is_empty() {
            bail!("no PNG or JPEG frames in {}", dir.display());
        }
        frames.sort();
        Ok(Self { frames, next: 0 })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for DirectoryCamera {
    fn capture(&mut self) -> NavResult<RgbImage> {
        let path = &self.frames[self.next];
        self.next = (self.next + 1) % self.frames.len();
        image::open(path)
            .map(|img| img.to_rgb8())
            .map_err(|e| NavError::capture(format!("{}: {e}", path.display())))
    }

    fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }
}
